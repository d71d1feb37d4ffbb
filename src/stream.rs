//! Streaming API: receive pipeline events as they happen.
//!
//! The orchestrator pushes events into an unbounded channel from a spawned
//! task; the caller consumes them as a [`Stream`]. The channel closes right
//! after the terminal event of the last file, so a `while let Some(..)` loop
//! ends by itself.
//!
//! Dropping the stream does not cancel the spawned run; events produced
//! afterwards are discarded.

use crate::events::PipelineEvent;
use crate::orchestrator::Extractor;
use crate::pipeline::input::DrawingInput;
use serde::Serialize;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_stream::Stream;
use tracing::debug;

/// A boxed stream of one file's events.
pub type EventStream = Pin<Box<dyn Stream<Item = PipelineEvent> + Send>>;

/// A boxed stream of events from a multi-file run.
pub type RunStream = Pin<Box<dyn Stream<Item = RunEvent> + Send>>;

/// An event tagged with the file it belongs to.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunEvent {
    /// 0-based position of the file in the run.
    pub file_index: usize,
    pub filename: String,
    #[serde(flatten)]
    pub event: PipelineEvent,
}

/// Run one drawing and stream its events.
///
/// # Example
/// ```rust,no_run
/// use drawspec::{extract_stream, DrawingInput, ExtractionConfig, Extractor, PipelineEvent};
/// use futures::StreamExt;
/// use std::sync::Arc;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = Arc::new(Extractor::new(ExtractionConfig::default())?);
/// let input = DrawingInput::new("cyl.pdf", std::fs::read("cyl.pdf")?);
/// let mut events = extract_stream(extractor, input);
/// while let Some(event) = events.next().await {
///     match event {
///         PipelineEvent::Status { message, progress, .. } => println!("{progress:.2} {message}"),
///         PipelineEvent::Failed { message } => eprintln!("error: {message}"),
///         PipelineEvent::Completed { final_result } => println!("{:?}", final_result.data),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn extract_stream(extractor: Arc<Extractor>, input: DrawingInput) -> EventStream {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let _ = extractor
            .process_file(&input, &mut |event| {
                if tx.send(event).is_err() {
                    debug!("event receiver dropped");
                }
            })
            .await;
    });
    Box::pin(UnboundedReceiverStream::new(rx))
}

/// Run several drawings one after another and stream every event.
pub fn extract_files_stream(extractor: Arc<Extractor>, inputs: Vec<DrawingInput>) -> RunStream {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        let names: Vec<String> = inputs.iter().map(|i| i.name.clone()).collect();
        extractor
            .process_files(&inputs, |file_index, event| {
                let tagged = RunEvent {
                    file_index,
                    filename: names[file_index].clone(),
                    event: event.clone(),
                };
                if tx.send(tagged).is_err() {
                    debug!("event receiver dropped");
                }
            })
            .await;
    });
    Box::pin(UnboundedReceiverStream::new(rx))
}
