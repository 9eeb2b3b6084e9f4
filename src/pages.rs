#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Page {
    Index,
    Error,
    Complete,
}

impl Page {
    fn file_name(&self) -> &'static str {
        match self {
            Page::Index => "index.html",
            Page::Error => "error/index.html",
            Page::Complete => "complete/index.html",
        }
    }

    fn builtin(&self) -> &'static str {
        match self {
            Page::Index => BUILTIN_INDEX,
            Page::Error => BUILTIN_ERROR,
            Page::Complete => BUILTIN_COMPLETE,
        }
    }
}

const BUILTIN_INDEX: &str = indoc::indoc! {r#"
    <!DOCTYPE html>
    <html>
    <head><meta charset="utf-8"><title>Device activation</title><link rel="icon" href="data:;base64,iVBORw0KGgo="></head>
    <body>
    <h1>Device activation</h1>
    <form method="post" action="/oauth/device/activate">
    <label for="user_code">Enter the code displayed on your device</label>
    <input id="user_code" name="user_code" autocomplete="off" autofocus required>
    <button type="submit">Continue</button>
    </form>
    </body>
    </html>
"#};

const BUILTIN_ERROR: &str = indoc::indoc! {r#"
    <!DOCTYPE html>
    <html>
    <head><meta charset="utf-8"><title>Device activation</title><link rel="icon" href="data:;base64,iVBORw0KGgo="></head>
    <body>
    <h1>Invalid code</h1>
    <p>The code is unknown, expired, or already used. Request a new code on your device.</p>
    <p><a href="/oauth/device/activate">Try again</a></p>
    </body>
    </html>
"#};

const BUILTIN_COMPLETE: &str = indoc::indoc! {r#"
    <!DOCTYPE html>
    <html>
    <head><meta charset="utf-8"><title>Device activation</title><link rel="icon" href="data:;base64,iVBORw0KGgo="></head>
    <body>
    <h1>Device activated</h1>
    <p>You can close this window and return to your device.</p>
    </body>
    </html>
"#};

pub fn mime_type(path: &str) -> Option<&'static str> {
    let ext = std::path::Path::new(path).extension()?.to_str()?;
    match ext.to_ascii_lowercase().as_str() {
        "css" => Some("text/css"),
        "js" => Some("text/javascript"),
        "svg" => Some("image/svg+xml"),
        "ico" => Some("image/vnd.microsoft.icon"),
        _ => None,
    }
}

#[derive(Debug, Clone, Default)]
pub struct Pages {
    dir: Option<std::path::PathBuf>,
}

impl Pages {
    pub fn new(dir: Option<&std::path::Path>) -> Self {
        Self {
            dir: dir.map(|d| d.to_path_buf()),
        }
    }

    pub async fn page(&self, page: Page) -> String {
        if let Some(ref dir) = self.dir {
            let path = dir.join(page.file_name());
            match tokio::fs::read_to_string(&path).await {
                Ok(s) => return s,
                Err(e) => {
                    tracing::warn!(path = %path.display(), err = %e, "Can't read page; using built-in one")
                }
            }
        }
        page.builtin().to_owned()
    }

    /// Static asset under `pages_dir` with a known content type.
    pub async fn resource(&self, path: &str) -> Option<(&'static str, Vec<u8>)> {
        let dir = self.dir.as_ref()?;
        let mime = mime_type(path)?;
        let relative = std::path::Path::new(path.trim_start_matches('/'));
        if !relative
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
        {
            tracing::warn!(path = %path, "Rejected resource path");
            return None;
        }
        match tokio::fs::read(dir.join(relative)).await {
            Ok(body) => Some((mime, body)),
            Err(e) => {
                tracing::debug!(path = %path, err = %e, "Resource not found");
                None
            }
        }
    }
}
