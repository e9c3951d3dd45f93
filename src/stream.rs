//! Reading several messages from one buffer

use crate::{Bulletin, Error, TableResolver};

type RejectSink<'a> = Box<dyn FnMut(&[u8], &Error) + 'a>;

/// Iterates over the BUFR messages found in a buffer.
///
/// Bytes before a `BUFR` marker (bulletin headings, line breaks) are
/// skipped. A message that fails to decode is yielded as an `Err`, handed to
/// the rejects sink if one is set, and the iteration carries on with the
/// next message. An allocation failure is yielded too, but ends the
/// iteration.
pub struct MessageStream<'a, T: ?Sized> {
    data: &'a [u8],
    pos: usize,
    tables: &'a T,
    rejects: Option<RejectSink<'a>>,
}

impl<'a, T: TableResolver + ?Sized> MessageStream<'a, T> {
    pub fn new(data: &'a [u8], tables: &'a T) -> Self {
        Self {
            data,
            pos: 0,
            tables,
            rejects: None,
        }
    }

    /// Sets a callback receiving the raw bytes of every rejected message.
    pub fn with_rejects(mut self, sink: impl FnMut(&[u8], &Error) + 'a) -> Self {
        self.rejects = Some(Box::new(sink));
        self
    }

    /// Byte offset of the next unread message.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn find_marker(&self, from: usize) -> Option<usize> {
        self.data
            .get(from..)?
            .windows(4)
            .position(|w| w == b"BUFR")
            .map(|p| from + p)
    }

    /// End of the message starting at `start`: its declared length when that
    /// lands right after a `7777`, `Err` with the offset to resume at
    /// otherwise.
    fn message_end(&self, start: usize) -> Result<usize, (usize, Error)> {
        let rest = &self.data[start..];
        let next_marker = || self.find_marker(start + 4).unwrap_or(self.data.len());
        if rest.len() < 8 {
            return Err((
                self.data.len(),
                Error::Truncated(format!("message at offset {start} ends inside section 0")),
            ));
        }
        let total_length = u32::from_be_bytes([0, rest[4], rest[5], rest[6]]) as usize;
        if total_length > rest.len() {
            return Err((
                next_marker(),
                Error::Truncated(format!(
                    "message at offset {start} declares {total_length} bytes but only {} remain",
                    rest.len()
                )),
            ));
        }
        if total_length < 8 + 4 || &rest[total_length - 4..total_length] != b"7777" {
            return Err((
                next_marker(),
                Error::Consistency(format!(
                    "message at offset {start} does not end with 7777 at its declared length {total_length}"
                )),
            ));
        }
        Ok(start + total_length)
    }

    /// Settles the decode result of the message at `start..end`.
    fn conclude(
        &mut self,
        start: usize,
        end: usize,
        result: Result<Bulletin, Error>,
    ) -> Result<Bulletin, Error> {
        let data = self.data;
        let raw = &data[start..end];
        match result {
            Ok(bulletin) => {
                tracing::debug!(
                    target: "bufrex::stream",
                    offset = start,
                    length = raw.len(),
                    "read message"
                );
                Ok(bulletin)
            }
            Err(err @ Error::Allocation(_)) => {
                tracing::error!(
                    target: "bufrex::stream",
                    offset = start,
                    error = %err,
                    "stopping"
                );
                self.pos = data.len();
                Err(err)
            }
            Err(err) => {
                self.reject(raw, start, &err);
                Err(err)
            }
        }
    }

    fn reject(&mut self, raw: &[u8], offset: usize, err: &Error) {
        tracing::warn!(
            target: "bufrex::stream",
            offset,
            length = raw.len(),
            error = %err,
            "skipping message"
        );
        if let Some(sink) = self.rejects.as_mut() {
            sink(raw, err);
        }
    }
}

impl<'a, T: TableResolver + ?Sized> Iterator for MessageStream<'a, T> {
    type Item = Result<Bulletin, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        let Some(start) = self.find_marker(self.pos) else {
            self.pos = self.data.len();
            return None;
        };
        if start > self.pos {
            tracing::trace!(
                target: "bufrex::stream",
                skipped = start - self.pos,
                "skipped bytes before message"
            );
        }

        let data = self.data;
        let end = match self.message_end(start) {
            Ok(end) => end,
            Err((resume, err)) => {
                self.pos = resume;
                self.reject(&data[start..resume], start, &err);
                return Some(Err(err));
            }
        };
        self.pos = end;

        let result = Bulletin::decode(&data[start..end], self.tables);
        Some(self.conclude(start, end, result))
    }
}
