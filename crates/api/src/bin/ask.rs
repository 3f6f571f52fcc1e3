//! Ask the chat server a question and print the decoded answer.

use anyhow::{Context, bail};
use clap::Parser;
use schema::ConversationMessage;
use serde_json::json;
use wire::{ContentSegment, STREAM_DATA_HEADER, parse_segments, process_stream};

#[derive(Parser)]
#[command(name = "ask", about = "Ask the BIAN assistant a question")]
struct Args {
    /// The question to ask
    question: String,

    /// Chat endpoint
    #[arg(long, env = "ASK_URL", default_value = "http://localhost:3000/api/chat")]
    url: String,

    /// Print the raw SVG markup for each diagram
    #[arg(long)]
    svg: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let body = json!({ "messages": [ConversationMessage::user(args.question.as_str())] });
    let response = reqwest::Client::new()
        .post(&args.url)
        .json(&body)
        .send()
        .await
        .with_context(|| format!("Failed to reach {}", args.url))?;

    let status = response.status();
    if !status.is_success() {
        let error = response.text().await.unwrap_or_default();
        bail!("Server responded with {}: {}", status, error);
    }
    if response.headers().get(STREAM_DATA_HEADER).is_none() {
        eprintln!("warning: response is missing the {} header", STREAM_DATA_HEADER);
    }

    let state = process_stream(response.bytes_stream(), |_| {})
        .await
        .context("Answer stream was interrupted")?;

    for segment in parse_segments(&state.text, &state.diagrams) {
        match segment {
            ContentSegment::Text(text) => print!("{}", text),
            ContentSegment::Diagram { index, diagram } => {
                println!("\n[Diagram {}: {}]", index, diagram.title);
                if !diagram.source_url.is_empty() {
                    println!("  source: {}", diagram.source_url);
                }
                if args.svg {
                    println!("{}", diagram.svg_content);
                }
            }
        }
    }
    println!();

    Ok(())
}
