type Output = Box<dyn tokio::io::AsyncWrite + Unpin + Send>;

pub async fn send(m: &str) {
    static OUTPUT: tokio::sync::OnceCell<tokio::sync::Mutex<Output>> =
        tokio::sync::OnceCell::const_new();
    let output = OUTPUT
        .get_or_init(|| async { tokio::sync::Mutex::new(output()) })
        .await;
    let s = if m.ends_with('\n') {
        m.to_owned()
    } else {
        format!("{m}\n")
    };
    let mut output = output.lock().await;
    if let Err(e) = write(&mut output, s.as_bytes()).await {
        tracing::warn!("Failed to write to terminal: {e}; {}", m);
    }
}

async fn write(output: &mut Output, s: &[u8]) -> std::io::Result<()> {
    use tokio::io::AsyncWriteExt;
    output.write_all(s).await?;
    output.flush().await?;
    Ok(())
}

fn output() -> Output {
    match std::fs::OpenOptions::new().append(true).open("/dev/tty") {
        Ok(file) => Box::new(tokio::fs::File::from_std(file)),
        Err(_) => Box::new(tokio::io::stderr()),
    }
}
