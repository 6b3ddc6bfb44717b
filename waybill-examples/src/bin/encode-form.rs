//! Example: encode a multipart form and decode it again
//!
//! Prints the wire form of a two-part message, then reads it back with the
//! streaming decoder.
//!
//! Run with: cargo run --bin encode-form

use waybill::multipart::{self, MultipartLimits};
use waybill::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let parts = vec![
        Part::text("title", "Quarterly report"),
        Part::file("attachment", "notes.txt", "text/plain", "line one\nline two\n"),
    ];

    let (boundary, body) = Body::encode_multipart(parts, None);
    let wire = body.bytes().await;

    println!("content-type: {}", multipart::content_type(&boundary));
    println!();
    println!("{}", String::from_utf8_lossy(&wire));
    println!();

    let mut decoder = Multipart::new(Body::from(wire), &boundary, MultipartLimits::default());
    while let Some(part) = decoder.try_next_part().await? {
        let name = part.name().unwrap_or_default().to_string();
        let filename = part.filename().map(str::to_string);
        let content = part.decoded_bytes().await?;
        println!(
            "part {name:?} (file: {filename:?}): {} bytes",
            content.len()
        );
    }

    Ok(())
}
