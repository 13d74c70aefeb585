use std::io;
use tokio::sync::mpsc;

use crate::streamer::{RecordSink, StreamRecord};

pub type Chunk = io::Result<Vec<u8>>;

/// Feeds NDJSON lines into a response body channel from a blocking thread.
///
/// Each record is its own chunk, so it reaches the client without waiting
/// for more output. The receiver is dropped when the client disconnects,
/// which this sink reports through [`RecordSink::is_disconnected`].
pub struct ChannelSink {
    tx: mpsc::Sender<Chunk>,
    disconnected: bool,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<Chunk>) -> Self {
        Self {
            tx,
            disconnected: false,
        }
    }
}

impl RecordSink for ChannelSink {
    fn write_record(&mut self, record: &StreamRecord) -> io::Result<()> {
        let mut line = serde_json::to_vec(record)?;
        line.push(b'\n');
        if self.tx.blocking_send(Ok(line)).is_err() {
            self.disconnected = true;
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected || self.tx.is_closed()
    }
}
