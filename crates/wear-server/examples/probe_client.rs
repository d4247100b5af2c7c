//! Example: dump every frame a wear server sends.
//!
//! Usage:
//!
//! ```bash
//! # Run server
//! cargo run -p wear-server
//!
//! # In another terminal, run this example
//! WEAR_PROBE_ADDR=127.0.0.1:25500 cargo run -p wear-server --example probe_client
//! ```
//!
//! Prints each frame's length and raw JSON, and how long it has been since
//! the previous frame (useful for eyeballing the heartbeat interval).

use std::env;
use std::error::Error;
use std::time::Instant;

use bytes::{Buf, BytesMut};
use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use wear_protocol::{decode_message, LENGTH_PREFIX_LEN};

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let addr = env::var("WEAR_PROBE_ADDR").unwrap_or_else(|_| "127.0.0.1:25500".to_string());

    println!("Connecting to {}...", addr);
    let mut stream = TcpStream::connect(&addr).await?;
    println!("Connected. Ctrl-C to quit.\n");

    let mut buffer = BytesMut::with_capacity(4096);
    let mut last = Instant::now();

    loop {
        // Fill until at least one complete frame is buffered.
        while !has_frame(&buffer) {
            if stream.read_buf(&mut buffer).await? == 0 {
                println!("\nServer closed the connection.");
                return Ok(());
            }
        }

        let len = buffer.get_u32() as usize;
        let payload = buffer.split_to(len);
        let elapsed = last.elapsed();
        last = Instant::now();

        let text = String::from_utf8_lossy(&payload);
        match decode_message(&payload) {
            Ok(msg) => println!("<< [{:>5} ms] {:<13} {}", elapsed.as_millis(), msg.kind(), text),
            Err(e) => println!("<< [{:>5} ms] INVALID ({}) {}", elapsed.as_millis(), e, text),
        }
    }
}

fn has_frame(buffer: &BytesMut) -> bool {
    if buffer.len() < LENGTH_PREFIX_LEN {
        return false;
    }
    let len = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    buffer.len() >= LENGTH_PREFIX_LEN + len
}
