/// Receives the results of parsing.
///
/// The parser calls [FrameSink::body_len] exactly once per message, as soon as the header is complete, then calls
/// [FrameSink::on_frame] once the body is complete.  Both calls happen in stream order.
pub trait FrameSink {
    /// Work out how long the body following this header is.  May be 0.
    fn body_len(&mut self, header: &[u8]) -> usize;

    fn on_frame(&mut self, header: &[u8], body: &[u8]);
}

impl<T: FrameSink + ?Sized> FrameSink for &mut T {
    fn body_len(&mut self, header: &[u8]) -> usize {
        (**self).body_len(header)
    }

    fn on_frame(&mut self, header: &[u8], body: &[u8]) {
        (**self).on_frame(header, body)
    }
}

#[derive(Debug, Eq, PartialEq, derive_more::Display, thiserror::Error)]
#[non_exhaustive]
pub enum ParserError {
    #[display(fmt = "header length must be at least 1 byte")]
    ZeroHeaderLength,

    #[display(fmt = "body length {} exceeds the limit of {}", len, limit)]
    BodyTooLong { len: usize, limit: usize },
}

/// A parser splits a byte stream into `(header, body)` messages.
///
/// To use, call [Parser::feed] with every chunk read off the stream.  Chunks may be any size: a message may span many
/// chunks and a chunk may contain many messages.  A message whose body length is 0 is delivered as soon as its header
/// is complete.
///
/// The parser is always either accumulating a header or accumulating a body.  Both buffers are cleared but not
/// shrunk after each message, so a connection carrying similarly sized messages stops allocating quickly.
#[derive(Debug)]
pub struct Parser {
    header_len: usize,
    max_body_len: Option<usize>,
    header: Vec<u8>,
    body: Vec<u8>,
    /// Set once the header is complete.
    body_len: Option<usize>,
}

impl Parser {
    /// Create a parser.
    ///
    /// `header_len` is the fixed length of every header on this stream and must be nonzero.  `max_body_len` is an
    /// optional limit on the body length the sink may ask for; exceeding it fails the parse before any body bytes are
    /// buffered.
    pub fn new(header_len: usize, max_body_len: Option<usize>) -> Result<Parser, ParserError> {
        if header_len == 0 {
            return Err(ParserError::ZeroHeaderLength);
        }

        Ok(Parser {
            header_len,
            max_body_len,
            header: Vec::with_capacity(header_len),
            body: vec![],
            body_len: None,
        })
    }

    pub fn header_len(&self) -> usize {
        self.header_len
    }

    /// Feed the parser a chunk of the stream, delivering every message it completes to `sink`.
    ///
    /// Returns how many messages were delivered.  After an error the parser is in an unspecified state and should be
    /// discarded along with the stream.
    pub fn feed(&mut self, mut chunk: &[u8], mut sink: impl FrameSink) -> Result<usize, ParserError> {
        let mut delivered = 0;

        while !chunk.is_empty() {
            let body_len = match self.body_len {
                Some(l) => l,
                None => {
                    let wanted = self.header_len - self.header.len();
                    let (head, rest) = chunk.split_at(wanted.min(chunk.len()));
                    self.header.extend_from_slice(head);
                    chunk = rest;

                    if self.header.len() < self.header_len {
                        break;
                    }

                    let l = sink.body_len(&self.header);
                    if let Some(limit) = self.max_body_len {
                        if l > limit {
                            return Err(ParserError::BodyTooLong { len: l, limit });
                        }
                    }
                    self.body_len = Some(l);
                    l
                }
            };

            // May take nothing, either because the body is empty or because the header used up the chunk.
            let wanted = body_len - self.body.len();
            let (head, rest) = chunk.split_at(wanted.min(chunk.len()));
            self.body.extend_from_slice(head);
            chunk = rest;

            if self.body.len() == body_len {
                sink.on_frame(&self.header, &self.body);
                delivered += 1;
                self.reset();
            }
        }

        Ok(delivered)
    }

    fn reset(&mut self) {
        self.header.clear();
        self.body.clear();
        self.body_len = None;
    }

    /// Is there a partially received message in this parser?
    pub fn is_mid_frame(&self) -> bool {
        !self.header.is_empty()
    }

    /// Number of bytes of the current, incomplete message which have been received so far.
    pub fn pending_bytes(&self) -> usize {
        self.header.len() + self.body.len()
    }
}
