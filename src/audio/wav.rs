//! Fixed 44-byte PCM WAV container used for every file the recorder writes
//!
//! The header is encoded and decoded field by field (little-endian), so the
//! byte layout never depends on struct layout.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::frame::{Frame, BYTES_PER_FRAME, CHANNELS};
use crate::error::{RecorderError, Result};

/// Size of the header in bytes
pub const HEADER_LEN: usize = 44;

const RIFF: [u8; 4] = *b"RIFF";
const WAVE: [u8; 4] = *b"WAVE";
const FMT: [u8; 4] = *b"fmt ";
const DATA: [u8; 4] = *b"data";

const FMT_CHUNKSIZE: u32 = 16;
const FORMAT_PCM: u16 = 1;
const BITS_PER_SAMPLE: u16 = 16;

/// Bytes of header that follow the RIFF size field and precede the data
const RIFF_OVERHEAD: u32 = 36;

/// Chunk stride used when copying frames to and from disk
const IO_CHUNK_FRAMES: usize = 4096;

/// `data_chunksize` for `frames` frames, or `None` if it (or the RIFF size
/// derived from it) does not fit in 32 bits
pub fn data_chunksize(frames: usize) -> Option<u32> {
    let bytes = u32::try_from(frames.checked_mul(BYTES_PER_FRAME)?).ok()?;
    bytes.checked_add(RIFF_OVERHEAD)?;
    Some(bytes)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WavHeader {
    pub riff_chunksize: u32,
    pub audio_format: u16,
    pub num_channels: u16,
    pub sample_rate: u32,
    pub byte_rate: u32,
    pub block_align: u16,
    pub bits_per_sample: u16,
    pub data_chunksize: u32,
}

impl WavHeader {
    /// Stereo 16-bit PCM header with no data yet
    pub fn empty(sample_rate: u32) -> Self {
        let block_align = CHANNELS * (BITS_PER_SAMPLE / 8);
        Self {
            riff_chunksize: RIFF_OVERHEAD,
            audio_format: FORMAT_PCM,
            num_channels: CHANNELS,
            sample_rate,
            byte_rate: sample_rate * u32::from(block_align),
            block_align,
            bits_per_sample: BITS_PER_SAMPLE,
            data_chunksize: 0,
        }
    }

    /// Stereo 16-bit PCM header for `frames` frames; `None` past the
    /// 32-bit size limit
    pub fn pcm_stereo(sample_rate: u32, frames: usize) -> Option<Self> {
        let data_chunksize = data_chunksize(frames)?;
        Some(Self {
            riff_chunksize: data_chunksize + RIFF_OVERHEAD,
            data_chunksize,
            ..Self::empty(sample_rate)
        })
    }

    pub fn frame_count(&self) -> usize {
        self.data_chunksize as usize / BYTES_PER_FRAME
    }

    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..4].copy_from_slice(&RIFF);
        buf[4..8].copy_from_slice(&self.riff_chunksize.to_le_bytes());
        buf[8..12].copy_from_slice(&WAVE);

        buf[12..16].copy_from_slice(&FMT);
        buf[16..20].copy_from_slice(&FMT_CHUNKSIZE.to_le_bytes());
        buf[20..22].copy_from_slice(&self.audio_format.to_le_bytes());
        buf[22..24].copy_from_slice(&self.num_channels.to_le_bytes());
        buf[24..28].copy_from_slice(&self.sample_rate.to_le_bytes());
        buf[28..32].copy_from_slice(&self.byte_rate.to_le_bytes());
        buf[32..34].copy_from_slice(&self.block_align.to_le_bytes());
        buf[34..36].copy_from_slice(&self.bits_per_sample.to_le_bytes());

        buf[36..40].copy_from_slice(&DATA);
        buf[40..44].copy_from_slice(&self.data_chunksize.to_le_bytes());
        buf
    }

    /// Parse and validate a header.
    ///
    /// Only the layout this codec writes is accepted: plain PCM, 16-bit,
    /// stereo, a 16-byte fmt chunk directly followed by the data chunk.
    pub fn from_bytes(buf: &[u8; HEADER_LEN]) -> std::result::Result<Self, String> {
        let tag = |at: usize| [buf[at], buf[at + 1], buf[at + 2], buf[at + 3]];
        let u16_at = |at: usize| u16::from_le_bytes([buf[at], buf[at + 1]]);
        let u32_at = |at: usize| u32::from_le_bytes(tag(at));

        if tag(0) != RIFF || tag(8) != WAVE {
            return Err("missing RIFF/WAVE signature".to_string());
        }
        if tag(12) != FMT || u32_at(16) != FMT_CHUNKSIZE {
            return Err("unexpected fmt chunk".to_string());
        }
        if tag(36) != DATA {
            return Err("data chunk does not follow fmt chunk".to_string());
        }

        let header = Self {
            riff_chunksize: u32_at(4),
            audio_format: u16_at(20),
            num_channels: u16_at(22),
            sample_rate: u32_at(24),
            byte_rate: u32_at(28),
            block_align: u16_at(32),
            bits_per_sample: u16_at(34),
            data_chunksize: u32_at(40),
        };

        if header.audio_format != FORMAT_PCM {
            return Err(format!("audio format {} is not PCM", header.audio_format));
        }
        if header.num_channels != CHANNELS || header.bits_per_sample != BITS_PER_SAMPLE {
            return Err(format!(
                "expected 16-bit stereo, got {}-bit with {} channels",
                header.bits_per_sample, header.num_channels
            ));
        }

        Ok(header)
    }

    fn read_from(path: &Path, reader: &mut impl Read) -> Result<Self> {
        let mut buf = [0u8; HEADER_LEN];
        reader.read_exact(&mut buf).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                RecorderError::invalid_wav(path, "file shorter than header")
            } else {
                RecorderError::io(path, e)
            }
        })?;
        Self::from_bytes(&buf).map_err(|reason| RecorderError::invalid_wav(path, reason))
    }
}

/// Write `frames` to `path` as a complete WAV file.
///
/// Returns the number of bytes written, header included.
pub fn encode(path: impl AsRef<Path>, frames: &[Frame], sample_rate: u32) -> Result<u64> {
    let mut writer = WavStreamWriter::create(path, sample_rate)?;
    writer.write_frames(frames)?;
    let frames = writer.finish()?;
    Ok((HEADER_LEN + frames * BYTES_PER_FRAME) as u64)
}

/// Read the header of `path` and return it with its frame count
pub fn decode(path: impl AsRef<Path>) -> Result<(WavHeader, usize)> {
    let path = path.as_ref();
    let mut file = File::open(path).map_err(|e| RecorderError::io(path, e))?;
    let header = WavHeader::read_from(path, &mut file)?;
    Ok((header, header.frame_count()))
}

/// Read all frames of `path` into `out` (cleared first).
///
/// Reads exactly `data_chunksize` bytes; a file cut short is rejected.
pub fn read_frames(path: impl AsRef<Path>, out: &mut Vec<Frame>) -> Result<WavHeader> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| RecorderError::io(path, e))?;
    let mut reader = BufReader::new(file);
    let header = WavHeader::read_from(path, &mut reader)?;

    out.clear();
    out.reserve(header.frame_count());

    let mut bytes = vec![0u8; IO_CHUNK_FRAMES * BYTES_PER_FRAME];
    let mut remaining = header.frame_count();
    while remaining > 0 {
        let n = remaining.min(IO_CHUNK_FRAMES);
        let chunk = &mut bytes[..n * BYTES_PER_FRAME];
        reader.read_exact(chunk).map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                RecorderError::invalid_wav(path, "data chunk shorter than declared")
            } else {
                RecorderError::io(path, e)
            }
        })?;
        out.extend(
            chunk
                .chunks_exact(BYTES_PER_FRAME)
                .map(|b| Frame::from_le_bytes([b[0], b[1], b[2], b[3]])),
        );
        remaining -= n;
    }

    debug!("Read {} frames from {}", out.len(), path.display());
    Ok(header)
}

/// Overwrite only the two size fields of an existing file's header.
///
/// A size whose RIFF total overflows 32 bits is refused before the file
/// is opened.
pub fn rewrite_header(path: impl AsRef<Path>, data_chunksize: u32) -> Result<()> {
    let path = path.as_ref();
    let riff_chunksize = data_chunksize
        .checked_add(RIFF_OVERHEAD)
        .ok_or_else(|| RecorderError::too_long(path, data_chunksize as usize / BYTES_PER_FRAME))?;
    let mut file = OpenOptions::new()
        .write(true)
        .open(path)
        .map_err(|e| RecorderError::io(path, e))?;
    write_sizes(&mut file, riff_chunksize, data_chunksize).map_err(|e| RecorderError::io(path, e))
}

fn write_sizes(
    file: &mut (impl Write + Seek),
    riff_chunksize: u32,
    data_chunksize: u32,
) -> std::io::Result<()> {
    file.seek(SeekFrom::Start(4))?;
    file.write_all(&riff_chunksize.to_le_bytes())?;
    file.seek(SeekFrom::Start(40))?;
    file.write_all(&data_chunksize.to_le_bytes())?;
    file.flush()
}

/// Streams frames into a WAV file whose length is not known up front.
///
/// A placeholder header is written on creation; `finish` seeks back and
/// patches the sizes to the frames actually written.
pub struct WavStreamWriter {
    path: PathBuf,
    writer: BufWriter<File>,
    frames: usize,
    scratch: Vec<u8>,
}

impl WavStreamWriter {
    pub fn create(path: impl AsRef<Path>, sample_rate: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)
            .map_err(|e| RecorderError::io(&path, e))?;

        let mut writer = BufWriter::new(file);
        writer
            .write_all(&WavHeader::empty(sample_rate).to_bytes())
            .map_err(|e| RecorderError::io(&path, e))?;

        Ok(Self {
            path,
            writer,
            frames: 0,
            scratch: Vec::with_capacity(IO_CHUNK_FRAMES * BYTES_PER_FRAME),
        })
    }

    /// Append `frames`. Refused without writing anything if the file
    /// would outgrow the 32-bit WAV size fields.
    pub fn write_frames(&mut self, frames: &[Frame]) -> Result<()> {
        let total = self.frames.saturating_add(frames.len());
        if data_chunksize(total).is_none() {
            return Err(RecorderError::too_long(&self.path, total));
        }

        for chunk in frames.chunks(IO_CHUNK_FRAMES) {
            self.scratch.clear();
            for frame in chunk {
                self.scratch.extend_from_slice(&frame.to_le_bytes());
            }
            self.writer
                .write_all(&self.scratch)
                .map_err(|e| RecorderError::io(&self.path, e))?;
        }
        self.frames += frames.len();
        Ok(())
    }

    /// Frames written so far
    pub fn frames_written(&self) -> usize {
        self.frames
    }

    /// Patch the header sizes and close the file. Returns the frame count.
    pub fn finish(self) -> Result<usize> {
        let Self {
            path,
            writer,
            frames,
            ..
        } = self;

        let file = writer
            .into_inner()
            .map_err(|e| RecorderError::io(&path, e.into_error()))?;
        drop(file);
        let size = data_chunksize(frames).ok_or_else(|| RecorderError::too_long(&path, frames))?;
        rewrite_header(&path, size)?;

        debug!("Finished {} ({} frames)", path.display(), frames);
        Ok(frames)
    }
}
