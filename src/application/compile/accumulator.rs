//! Collects engine output chunks into the final artifact bytes.

use bytes::{Bytes, BytesMut};
use tokio::sync::mpsc;

/// Producer side handed to whatever reads the engine output.
pub type ChunkSink = mpsc::Sender<Bytes>;

/// Create a bounded chunk channel and the accumulator draining it.
pub fn channel(capacity: usize) -> (ChunkSink, OutputAccumulator) {
    let (tx, rx) = mpsc::channel(capacity.max(1));
    (tx, OutputAccumulator::new(rx))
}

/// Appends chunks in arrival order and concatenates them once the producer is done.
///
/// The accumulator never judges the output; an empty result is reported as
/// zero bytes and the job decides what that means.
#[derive(Debug)]
pub struct OutputAccumulator {
    rx: mpsc::Receiver<Bytes>,
    chunks: Vec<Bytes>,
    total: usize,
}

impl OutputAccumulator {
    fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        Self {
            rx,
            chunks: Vec::new(),
            total: 0,
        }
    }

    /// Drain the channel until every sender is dropped, then concatenate.
    pub async fn collect(mut self) -> Bytes {
        while let Some(chunk) = self.rx.recv().await {
            self.push(chunk);
        }
        self.finish()
    }

    fn push(&mut self, chunk: Bytes) {
        self.total += chunk.len();
        self.chunks.push(chunk);
    }

    fn finish(mut self) -> Bytes {
        if self.chunks.len() == 1 {
            return self.chunks.pop().unwrap_or_default();
        }
        let mut buffer = BytesMut::with_capacity(self.total);
        for chunk in &self.chunks {
            buffer.extend_from_slice(chunk);
        }
        buffer.freeze()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn concatenates_in_arrival_order() {
        let (sink, accumulator) = channel(2);
        let producer = tokio::spawn(async move {
            for part in ["%PDF-", "1.5\n", "", "%%EOF"] {
                sink.send(Bytes::from(part)).await.expect("receiver alive");
            }
        });

        let bytes = accumulator.collect().await;
        producer.await.expect("producer finished");
        assert_eq!(&bytes[..], b"%PDF-1.5\n%%EOF");
    }

    #[tokio::test]
    async fn repeated_chunks_are_kept() {
        let (sink, accumulator) = channel(4);
        sink.send(Bytes::from_static(b"ab")).await.expect("send");
        sink.send(Bytes::from_static(b"ab")).await.expect("send");
        drop(sink);

        assert_eq!(&accumulator.collect().await[..], b"abab");
    }

    #[tokio::test]
    async fn no_chunks_yields_empty_bytes() {
        let (sink, accumulator) = channel(1);
        drop(sink);
        assert!(accumulator.collect().await.is_empty());
    }
}
