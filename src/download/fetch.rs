use anyhow::{anyhow, Context, Result};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Something that can fetch a URL into a file.
pub trait Fetcher: Sync {
    fn fetch(&self, url: &str, dest: &Path) -> Result<()>;
}

/// Blocking HTTP fetcher.
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    /// `timeout` bounds connecting and each read, not the whole transfer.
    pub fn new(timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout_read(timeout)
            .user_agent(concat!("distant-viewing-tools/", env!("CARGO_PKG_VERSION")))
            .build();
        Self { agent }
    }
}

fn partial_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_os_string();
    name.push(".part");
    PathBuf::from(name)
}

impl Fetcher for HttpFetcher {
    /// Stream the body into `<dest>.part` and move it into place once
    /// complete, so an interrupted run never leaves a truncated image that
    /// a later run would skip as existing.
    fn fetch(&self, url: &str, dest: &Path) -> Result<()> {
        // Non-2xx statuses come back as errors
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| anyhow!("GET {}: {}", url, e))?;

        let part = partial_path(dest);
        let result = (|| -> Result<()> {
            let mut writer = BufWriter::new(File::create(&part)?);
            std::io::copy(&mut response.into_reader(), &mut writer)?;
            writer.flush()?;
            std::fs::rename(&part, dest)?;
            Ok(())
        })();

        if result.is_err() {
            let _ = std::fs::remove_file(&part);
        }
        result.with_context(|| format!("Failed to save {}", dest.display()))
    }
}

/// One-shot HTTP server answering the first request with `response`.
#[cfg(test)]
pub(crate) fn serve_once(response: &'static [u8]) -> String {
    use std::io::Read;
    use std::net::TcpListener;

    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().unwrap();
        let mut request = Vec::new();
        let mut buf = [0u8; 1024];
        while !request.windows(4).any(|w| w == b"\r\n\r\n") {
            match stream.read(&mut buf) {
                Ok(0) | Err(_) => break,
                Ok(n) => request.extend_from_slice(&buf[..n]),
            }
        }
        let _ = stream.write_all(response);
    });
    format!("http://{addr}/image.jpg")
}
