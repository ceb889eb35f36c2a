//! Audio pages and the Ogg page source
//!
//! The pacer consumes pages through [`PageSource`]. [`OggPageSource`] is the
//! production implementation, backed by the Ogg reader of the `webrtc` crate.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tracing::{debug, info};
use webrtc::media::io::ogg_reader::OggReader;

use crate::error::{Result, WhipError};

/// One demuxed container page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPage {
    /// Page payload, handed to the track unchanged
    pub payload: Bytes,
    /// Samples decoded from the start of the stream up to this page
    pub granule_position: u64,
}

impl AudioPage {
    /// Create a page
    pub fn new(payload: impl Into<Bytes>, granule_position: u64) -> Self {
        Self {
            payload: payload.into(),
            granule_position,
        }
    }
}

/// A sequential reader of audio pages.
///
/// `Ok(None)` marks the end of the container, which is not an error.
pub trait PageSource: Send {
    /// Read the next page
    fn next_page(&mut self) -> Result<Option<AudioPage>>;
}

impl<S: PageSource + ?Sized> PageSource for Box<S> {
    fn next_page(&mut self) -> Result<Option<AudioPage>> {
        (**self).next_page()
    }
}

/// Remembers whether the wrapped reader has run dry
struct EofReader<R> {
    inner: R,
    exhausted: Arc<AtomicBool>,
}

impl<R: Read> Read for EofReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n == 0 && !buf.is_empty() {
            self.exhausted.store(true, Ordering::Release);
        }
        Ok(n)
    }
}

/// Pages of an Ogg/Opus stream
pub struct OggPageSource<R: Read> {
    reader: OggReader<EofReader<R>>,
    exhausted: Arc<AtomicBool>,
    pages_read: u64,
}

impl OggPageSource<BufReader<File>> {
    /// Open an Ogg file and read its Opus ID header
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(WhipError::MissingAudioFile {
                path: path.to_path_buf(),
            });
        }

        let file = File::open(path)?;
        debug!("Opened audio file {}", path.display());
        Self::new(BufReader::new(file)).map_err(|e| match e {
            WhipError::Container(source) => WhipError::UnreadableAudioFile {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }
}

impl<R: Read> OggPageSource<R> {
    /// Wrap a reader positioned at the start of an Ogg stream.
    ///
    /// Page checksums are validated.
    pub fn new(reader: R) -> Result<Self> {
        let exhausted = Arc::new(AtomicBool::new(false));
        let reader = EofReader {
            inner: reader,
            exhausted: Arc::clone(&exhausted),
        };

        let (reader, header) = OggReader::new(reader, true)?;
        info!(
            "Ogg stream: {} channel(s), {} Hz input, pre-skip {}",
            header.channels, header.sample_rate, header.pre_skip
        );

        Ok(Self {
            reader,
            exhausted,
            pages_read: 0,
        })
    }

    /// Number of pages returned so far, excluding the ID header page
    pub fn pages_read(&self) -> u64 {
        self.pages_read
    }
}

impl<R: Read + Send> PageSource for OggPageSource<R> {
    fn next_page(&mut self) -> Result<Option<AudioPage>> {
        match self.reader.parse_next_page() {
            Ok((payload, header)) => {
                self.pages_read += 1;
                Ok(Some(AudioPage {
                    payload: payload.freeze(),
                    granule_position: header.granule_position,
                }))
            }
            // Running out of bytes, even mid-page, ends the stream
            Err(_) if self.exhausted.load(Ordering::Acquire) => {
                debug!("Reached end of Ogg stream after {} pages", self.pages_read);
                Ok(None)
            }
            Err(err) => Err(err.into()),
        }
    }
}
