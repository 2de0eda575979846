use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cache::{CacheKey, CacheStore};
use crate::error::{Error, Result};

/// Remote cache speaking plain GET/PUT under a base URL, authorized with a bearer token.
pub struct HttpCache {
    base: String,
    token: Option<String>,
    client: reqwest::blocking::Client,
}

impl HttpCache {
    pub fn new(base: &str, token: Option<String>) -> Result<Self> {
        let base = base.trim().trim_end_matches('/').to_string();
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(Error::msg(format!(
                "cache url '{base}' must start with http:// or https://"
            )));
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| Error::msg(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            base,
            token,
            client,
        })
    }

    fn url(&self, key: &CacheKey, file: &str) -> String {
        format!("{}/{}/{}", self.base, key.rel_dir(), file)
    }

    // Ok(None) on 404.
    fn get(&self, url: &str) -> Result<Option<Vec<u8>>> {
        let mut req = self.client.get(url);
        if let Some(t) = self.token.as_deref() {
            req = req.bearer_auth(t);
        }
        let res = req
            .send()
            .map_err(|e| Error::msg(format!("HTTP download failed: {e}")))?;
        if res.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !res.status().is_success() {
            return Err(Error::msg(format!(
                "HTTP download of {url} failed with status {}",
                res.status()
            )));
        }
        let body = res
            .bytes()
            .map_err(|e| Error::msg(format!("HTTP download failed: {e}")))?;
        Ok(Some(body.to_vec()))
    }

    fn put(&self, url: &str, body: Vec<u8>) -> Result<()> {
        let mut req = self.client.put(url).body(body);
        if let Some(t) = self.token.as_deref() {
            req = req.bearer_auth(t);
        }
        let res = req
            .send()
            .map_err(|e| Error::msg(format!("HTTP upload failed: {e}")))?;
        if res.status().is_success() {
            return Ok(());
        }
        Err(Error::msg(format!(
            "HTTP upload of {url} failed with status {}",
            res.status()
        )))
    }
}

fn write_file(path: &Path, body: &[u8]) -> Result<()> {
    fs::write(path, body).map_err(|e| Error::msg(format!("failed to write {}: {e}", path.display())))
}

impl CacheStore for HttpCache {
    fn describe(&self) -> String {
        self.base.clone()
    }

    fn fetch(&self, key: &CacheKey, archive_out: &Path, meta_out: &Path) -> Result<bool> {
        let Some(archive) = self.get(&self.url(key, &key.archive_name()))? else {
            return Ok(false);
        };
        write_file(archive_out, &archive)?;
        if let Some(meta) = self.get(&self.url(key, &key.meta_name()))? {
            write_file(meta_out, &meta)?;
        }
        Ok(true)
    }

    fn store(&self, key: &CacheKey, archive: &Path, meta: &str) -> Result<()> {
        self.put(&self.url(key, &key.meta_name()), meta.as_bytes().to_vec())?;
        let body = fs::read(archive)
            .map_err(|e| Error::msg(format!("failed to read {}: {e}", archive.display())))?;
        self.put(&self.url(key, &key.archive_name()), body)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::path::PathBuf;
    use std::thread;

    use super::*;
    use crate::cache;
    use crate::util;

    // Serves GET from `root` and stores PUT bodies under it. Records Authorization headers.
    fn spawn_cache_server(
        root: PathBuf,
        request_limit: usize,
    ) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
        let addr = listener.local_addr().expect("addr");
        let handle = thread::spawn(move || {
            let mut auth = Vec::new();
            for _ in 0..request_limit {
                let (stream, _) = listener.accept().expect("accept");
                let mut reader = BufReader::new(stream.try_clone().expect("clone"));
                let mut line = String::new();
                reader.read_line(&mut line).expect("request line");
                let parts: Vec<&str> = line.split_whitespace().collect();
                let (method, path) = (parts[0].to_string(), parts[1].to_string());
                let mut content_length = 0usize;
                loop {
                    let mut header = String::new();
                    reader.read_line(&mut header).expect("header");
                    let header = header.trim_end();
                    if header.is_empty() {
                        break;
                    }
                    let lower = header.to_ascii_lowercase();
                    if let Some(v) = lower.strip_prefix("content-length:") {
                        content_length = v.trim().parse().expect("length");
                    }
                    if lower.starts_with("authorization:") {
                        auth.push(header["authorization:".len()..].trim().to_string());
                    }
                }
                let fpath = root.join(path.trim_start_matches('/'));
                let mut stream = stream;
                if method == "PUT" {
                    let mut body = vec![0u8; content_length];
                    reader.read_exact(&mut body).expect("body");
                    fs::create_dir_all(fpath.parent().expect("parent")).expect("mkdir");
                    fs::write(&fpath, body).expect("store");
                    stream
                        .write_all(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
                        .expect("write");
                } else if fpath.is_file() {
                    let body = fs::read(&fpath).expect("read");
                    let hdr = format!(
                        "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                        body.len()
                    );
                    stream.write_all(hdr.as_bytes()).expect("hdr");
                    stream.write_all(&body).expect("body");
                } else {
                    let _ = stream.write_all(
                        b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                    );
                }
            }
            auth
        });
        (format!("http://{addr}"), handle)
    }

    fn key(meta: &str) -> CacheKey {
        CacheKey {
            platform: "x86_64-linux".into(),
            project: "default".into(),
            build_type: "release".into(),
            name_version: "libbar@3.0".into(),
            hash: util::sha256_hex(meta.as_bytes()),
        }
    }

    #[test]
    fn miss_then_store_then_hit() {
        let tmp = tempfile::tempdir().expect("tempdir");
        let server_root = tmp.path().join("server");
        // miss (1 GET), store (2 PUT), hit (2 GET)
        let (url, handle) = spawn_cache_server(server_root.clone(), 5);
        let store = HttpCache::new(&url, Some("s3cret".into())).expect("client");

        let meta = "# -------- libbar@3.0 --------\n";
        let key = key(meta);
        let scratch = tmp.path().join("scratch");
        let restored = tmp.path().join("restored");
        assert!(!cache::restore(&store, &key, &restored, &scratch).expect("miss"));

        let pkg = tmp.path().join("pkg");
        fs::create_dir_all(pkg.join("lib")).expect("mkdir");
        fs::write(pkg.join("lib/libbar.a"), "bar").expect("lib");
        cache::publish(&store, &key, &pkg, meta, &scratch).expect("publish");
        assert!(server_root.join(key.rel_dir()).join(key.meta_name()).is_file());

        assert!(cache::restore(&store, &key, &restored, &scratch).expect("hit"));
        assert!(restored.join("lib/libbar.a").is_file());

        let auth = handle.join().expect("server");
        assert_eq!(auth.len(), 5);
        assert!(auth.iter().all(|a| a == "Bearer s3cret"));
    }

    #[test]
    fn rejects_non_http_urls() {
        assert!(HttpCache::new("ftp://cache", None).is_err());
    }
}
