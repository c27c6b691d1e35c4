//! Simulates a burst of typing from several threads, then "saves" the document.
//!
//! Run with `RUST_LOG=editor_buffer=trace` to watch the drain worker merge keystrokes, and
//! `EDITOR_BUFFER_IDLE_MICROS=<n>` to change how often an idle worker polls.

use editor_buffer::{BufferConfig, TextBuffer};
use std::thread;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

fn main() -> editor_buffer::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = BufferConfig::from_env().with_worker_name("keystroke-burst-drain");
    tracing::info!(idle = ?config.idle_interval, "starting keystroke burst");

    let buffer = TextBuffer::with_config("// scratch\n", config);
    let start = Instant::now();

    let results: Vec<_> = thread::scope(|scope| {
        let writers: Vec<_> = (0..4)
            .map(|writer| {
                let buffer = &buffer;
                scope.spawn(move || -> editor_buffer::Result<()> {
                    for line in 0..250 {
                        let end = buffer.len()?;
                        buffer.insert(end, &format!("writer {writer} line {line:03}\n"))?;
                    }
                    Ok(())
                })
            })
            .collect();
        writers
            .into_iter()
            .map(|writer| writer.join().expect("writer thread panicked"))
            .collect()
    });
    for result in results {
        result?;
    }

    buffer.flush()?;
    let typing_time = start.elapsed();

    let saved = buffer.snapshot()?;
    println!("editor-buffer keystroke burst");
    println!("  chars: {}", saved.len());
    println!("  lines: {}", saved.line_count());
    println!("  tree height: {}", saved.height());
    println!("  elapsed: {typing_time:?}");

    let rope = buffer.into_rope();
    assert_eq!(rope, saved);
    Ok(())
}
