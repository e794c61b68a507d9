use bytes::{Buf, BytesMut};
use encoding_rs::{DecoderResult, Encoding};
use std::io;
use tokio_util::codec::Decoder;

/// Strict charset -> UTF-8 transcoder.
///
/// Unlike a replacing decoder, malformed input is an error: a file that does
/// not decode in its declared charset is not a CSV we can trust.
pub struct Transcoder {
    encoding: &'static Encoding,
    decoder: encoding_rs::Decoder,
    finished: bool,
}

impl Transcoder {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self {
            encoding,
            // BOM sniffing: a BOM overrides the declared charset and is removed
            decoder: encoding.new_decoder(),
            finished: false,
        }
    }

    fn transcode(&mut self, src: &mut BytesMut, last: bool) -> io::Result<Option<BytesMut>> {
        let capacity = self
            .decoder
            .max_utf8_buffer_length_without_replacement(src.len())
            .unwrap_or_else(|| src.len() * 3 + 16);
        let mut out = vec![0; capacity];

        let (result, bytes_read, bytes_written) =
            self.decoder
                .decode_to_utf8_without_replacement(src, &mut out, last);

        if let DecoderResult::Malformed(_, _) = result {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("file is not valid {}", self.encoding.name()),
            ));
        }

        src.advance(bytes_read);
        if bytes_written == 0 {
            return Ok(None);
        }
        Ok(Some(BytesMut::from(&out[..bytes_written])))
    }
}

impl Decoder for Transcoder {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        if src.is_empty() {
            return Ok(None);
        }
        self.transcode(src, false)
    }

    fn decode_eof(&mut self, buf: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        // encoding_rs decoders must not be fed again after `last = true`
        if self.finished {
            buf.clear();
            return Ok(None);
        }
        self.finished = true;
        let out = self.transcode(buf, true)?;
        buf.clear();
        Ok(out)
    }
}
