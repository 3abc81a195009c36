//! One-shot HTTP responders for exercising the real client without a backend.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::thread::JoinHandle;

/// Answers exactly one request with `200 OK` and `body`, handing back the
/// request head it saw.
pub fn serve_once(body: &'static str) -> (String, JoinHandle<String>) {
    serve_once_with("200 OK", body)
}

/// Like [`serve_once`] with an arbitrary status line such as `"401 Unauthorized"`.
pub fn serve_once_with(status: &'static str, body: &'static str) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let base = format!("http://{}", listener.local_addr().expect("addr"));
    let handle = std::thread::spawn(move || {
        let (mut stream, _) = listener.accept().expect("accept");
        let mut seen = Vec::new();
        let mut buf = [0u8; 1024];
        while !seen.windows(4).any(|w| w == b"\r\n\r\n") {
            let n = stream.read(&mut buf).expect("read");
            if n == 0 {
                break;
            }
            seen.extend_from_slice(&buf[..n]);
        }
        let head_end = seen.windows(4).position(|w| w == b"\r\n\r\n").map_or(seen.len(), |p| p + 4);
        let head = String::from_utf8_lossy(&seen[..head_end]).into_owned();
        // Drain the body so the client never sees a reset mid-upload.
        let expected = head
            .lines()
            .find_map(|l| {
                let (name, value) = l.split_once(':')?;
                name.eq_ignore_ascii_case("content-length").then(|| value.trim().parse::<usize>().ok())?
            })
            .unwrap_or(0);
        let mut body_seen = seen.len() - head_end;
        while body_seen < expected {
            let n = stream.read(&mut buf).expect("read body");
            if n == 0 {
                break;
            }
            body_seen += n;
        }
        let reply = format!(
            "HTTP/1.1 {status}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        );
        stream.write_all(reply.as_bytes()).expect("write");
        head
    });
    (base, handle)
}
