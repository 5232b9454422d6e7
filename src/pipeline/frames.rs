//! Multi-frame TIFF access: one page per IFD, decoded on demand.
//!
//! `image` only exposes the first frame of a TIFF, so frames are walked with
//! the `tiff` decoder directly. Moving to the next IFD reads only the
//! directory entries; strip data is decoded when the page is pulled.
//!
//! ## Palette frames
//!
//! The `tiff` decoder refuses RGBPalette frames outright. Their samples are
//! still plain unsigned integers, so the frame is reopened through
//! [`Relabelled`], which presents its PhotometricInterpretation as
//! BlackIsZero. The decoder then handles compression and bit packing as for
//! grayscale, and the indices are mapped through the ColorMap here.

use crate::error::{PageMergeError, Result};
use crate::pipeline::encode::{encode_png, flatten};
use crate::pipeline::pages::Page;
use image::{DynamicImage, ImageBuffer, Luma, LumaA, Rgb, Rgba};
use std::fs::File;
use std::io::{self, BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::tags::{ByteOrder, PhotometricInterpretation, Tag};
use tiff::ColorType;
use tracing::{debug, info};

type TiffDecoder = Decoder<BufReader<File>>;

fn open_decoder(path: &Path) -> Result<TiffDecoder> {
    let file = File::open(path).map_err(|e| PageMergeError::from_io(path, e))?;
    Decoder::new(BufReader::new(file)).map_err(|e| PageMergeError::EmptyDocument {
        path: path.to_path_buf(),
        detail: format!("no readable TIFF frame: {e}"),
    })
}

/// Count frames by walking the IFD chain without decoding pixels.
pub(crate) fn tiff_frame_count(path: &Path) -> Result<usize> {
    let mut decoder = open_decoder(path)?;
    let mut frames = 1;
    while decoder.more_images() {
        decoder
            .next_image()
            .map_err(|e| PageMergeError::ImageDecodeFailed {
                page: frames + 1,
                detail: e.to_string(),
            })?;
        frames += 1;
    }
    Ok(frames)
}

/// An open TIFF yielding frames in storage order.
pub(crate) struct TiffSource {
    decoder: TiffDecoder,
    path: PathBuf,
    next: usize,
    exhausted: bool,
}

impl TiffSource {
    /// Open the file and read the first IFD. A TIFF with no readable frame
    /// fails here with `EmptyDocument`.
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let decoder = open_decoder(path)?;
        info!(path = %path.display(), "TIFF opened");
        Ok(Self {
            decoder,
            path: path.to_path_buf(),
            next: 0,
            exhausted: false,
        })
    }

    pub(crate) fn next_frame(&mut self) -> Option<Result<Page>> {
        if self.exhausted {
            return None;
        }
        let index = self.next;

        // Advance lazily so a capped stream never reads IFDs it won't use.
        if index > 0 {
            if !self.decoder.more_images() {
                self.exhausted = true;
                return None;
            }
            if let Err(e) = self.decoder.next_image() {
                self.exhausted = true;
                return Some(Err(PageMergeError::ImageDecodeFailed {
                    page: index + 1,
                    detail: e.to_string(),
                }));
            }
        }
        self.next += 1;

        let result = self.decode_current(index);
        if result.is_err() {
            self.exhausted = true;
        }
        Some(result)
    }

    fn decode_current(&mut self, index: usize) -> Result<Page> {
        let page_num = index + 1;
        let decode_err = |detail: String| PageMergeError::ImageDecodeFailed {
            page: page_num,
            detail,
        };

        let (width, height) = self
            .decoder
            .dimensions()
            .map_err(|e| decode_err(e.to_string()))?;
        let photometric = self
            .decoder
            .find_tag_unsigned::<u16>(Tag::PhotometricInterpretation)
            .map_err(|e| decode_err(e.to_string()))?;

        let (color, color_map, data) =
            if photometric == Some(PhotometricInterpretation::RGBPalette.to_u16()) {
                let bits = self
                    .decoder
                    .find_tag_unsigned_vec::<u16>(Tag::BitsPerSample)
                    .map_err(|e| decode_err(e.to_string()))?
                    .and_then(|bits| bits.first().copied())
                    .unwrap_or(1);
                let map = self
                    .decoder
                    .get_tag_u16_vec(Tag::ColorMap)
                    .map_err(|e| decode_err(format!("palette without colour map: {e}")))?;
                let data = self.read_palette_indices(index).map_err(decode_err)?;
                let bits = u8::try_from(bits).unwrap_or(u8::MAX);
                (ColorType::Palette(bits), Some(map), data)
            } else {
                let color = self
                    .decoder
                    .colortype()
                    .map_err(|e| decode_err(e.to_string()))?;
                let data = self
                    .decoder
                    .read_image()
                    .map_err(|e| decode_err(e.to_string()))?;
                (color, None, data)
            };

        let img = frame_to_image(width, height, color, data, color_map.as_deref())
            .map_err(decode_err)?;
        debug!(
            path = %self.path.display(),
            page = page_num,
            width,
            height,
            color = ?color,
            "Decoded TIFF frame"
        );

        let png = encode_png(&flatten(img), page_num)?;
        Ok(Page { index, png })
    }

    /// Decode the current palette frame's raw indices through a second,
    /// relabelled reader positioned on the same IFD.
    fn read_palette_indices(&mut self, index: usize) -> std::result::Result<DecodingResult, String> {
        let ifd = self
            .decoder
            .ifd_pointer()
            .ok_or_else(|| "no current TIFF directory".to_string())?;
        let order = self.decoder.byte_order();

        let file = File::open(&self.path).map_err(|e| e.to_string())?;
        let mut reader = BufReader::new(file);
        let at = photometric_value_offset(&mut reader, ifd.0)
            .map_err(|e| format!("reading TIFF directory: {e}"))?
            .ok_or_else(|| "palette frame without a SHORT PhotometricInterpretation".to_string())?;
        reader.seek(SeekFrom::Start(0)).map_err(|e| e.to_string())?;

        let gray = PhotometricInterpretation::BlackIsZero.to_u16();
        let patch = match order {
            ByteOrder::LittleEndian => gray.to_le_bytes(),
            ByteOrder::BigEndian => gray.to_be_bytes(),
        };
        let mut decoder = Decoder::new(Relabelled::new(reader, at, patch))
            .map_err(|e| e.to_string())?;
        decoder.seek_to_image(index).map_err(|e| e.to_string())?;
        decoder.read_image().map_err(|e| e.to_string())
    }
}

/// File offset of the PhotometricInterpretation value in the IFD at
/// `ifd_offset`, or `None` when the entry is missing or not a SHORT.
fn photometric_value_offset<R: Read + Seek>(
    reader: &mut R,
    ifd_offset: u64,
) -> io::Result<Option<u64>> {
    let mut header = [0u8; 4];
    reader.seek(SeekFrom::Start(0))?;
    reader.read_exact(&mut header)?;
    let little = &header[..2] == b"II";
    let u16_at = |b: [u8; 2]| {
        if little {
            u16::from_le_bytes(b)
        } else {
            u16::from_be_bytes(b)
        }
    };
    let bigtiff = u16_at([header[2], header[3]]) == 43;

    reader.seek(SeekFrom::Start(ifd_offset))?;
    let (entries, entry_len, value_at) = if bigtiff {
        let mut count = [0u8; 8];
        reader.read_exact(&mut count)?;
        let count = if little {
            u64::from_le_bytes(count)
        } else {
            u64::from_be_bytes(count)
        };
        (count, 20u64, 12u64)
    } else {
        let mut count = [0u8; 2];
        reader.read_exact(&mut count)?;
        (u64::from(u16_at(count)), 12u64, 8u64)
    };
    let first_entry = ifd_offset + if bigtiff { 8 } else { 2 };

    let mut entry = [0u8; 4];
    for i in 0..entries {
        let start = first_entry + i * entry_len;
        reader.seek(SeekFrom::Start(start))?;
        reader.read_exact(&mut entry)?;
        if u16_at([entry[0], entry[1]]) == Tag::PhotometricInterpretation.to_u16() {
            // Field type 3 is SHORT.
            return Ok((u16_at([entry[2], entry[3]]) == 3).then_some(start + value_at));
        }
    }
    Ok(None)
}

/// A reader that substitutes two bytes at a fixed offset.
struct Relabelled<R> {
    inner: R,
    pos: u64,
    at: u64,
    patch: [u8; 2],
}

impl<R> Relabelled<R> {
    fn new(inner: R, at: u64, patch: [u8; 2]) -> Self {
        Self {
            inner,
            pos: 0,
            at,
            patch,
        }
    }
}

impl<R: Read> Read for Relabelled<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        for (i, byte) in buf[..n].iter_mut().enumerate() {
            let abs = self.pos + i as u64;
            if abs >= self.at && abs < self.at + 2 {
                *byte = self.patch[(abs - self.at) as usize];
            }
        }
        self.pos += n as u64;
        Ok(n)
    }
}

impl<R: Seek> Seek for Relabelled<R> {
    fn seek(&mut self, from: SeekFrom) -> io::Result<u64> {
        self.pos = self.inner.seek(from)?;
        Ok(self.pos)
    }
}

/// Build a `DynamicImage` from one decoded frame. Palette, CMYK and
/// sub-byte gray frames come out as 8-bit; alpha is left for [`flatten`].
fn frame_to_image(
    width: u32,
    height: u32,
    color: ColorType,
    data: DecodingResult,
    color_map: Option<&[u16]>,
) -> std::result::Result<DynamicImage, String> {
    let size_mismatch = || format!("sample buffer does not match {width}x{height} {color:?}");

    let img = match (color, data) {
        (ColorType::Gray(bits @ (1 | 2 | 4)), DecodingResult::U8(packed)) => {
            let scale = 255 / ((1u8 << bits) - 1);
            let levels = unpack_samples(&packed, width, height, bits)?
                .into_iter()
                .map(|v| v * scale)
                .collect();
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, levels)
                .map(DynamicImage::ImageLuma8)
        }
        (ColorType::Gray(8), DecodingResult::U8(v)) => {
            ImageBuffer::<Luma<u8>, _>::from_raw(width, height, v).map(DynamicImage::ImageLuma8)
        }
        (ColorType::Gray(16), DecodingResult::U16(v)) => {
            ImageBuffer::<Luma<u16>, _>::from_raw(width, height, v).map(DynamicImage::ImageLuma16)
        }
        (ColorType::GrayA(8), DecodingResult::U8(v)) => {
            ImageBuffer::<LumaA<u8>, _>::from_raw(width, height, v).map(DynamicImage::ImageLumaA8)
        }
        (ColorType::GrayA(16), DecodingResult::U16(v)) => {
            ImageBuffer::<LumaA<u16>, _>::from_raw(width, height, v)
                .map(DynamicImage::ImageLumaA16)
        }
        (ColorType::RGB(8), DecodingResult::U8(v)) => {
            ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, v).map(DynamicImage::ImageRgb8)
        }
        (ColorType::RGB(16), DecodingResult::U16(v)) => {
            ImageBuffer::<Rgb<u16>, _>::from_raw(width, height, v).map(DynamicImage::ImageRgb16)
        }
        (ColorType::RGBA(8), DecodingResult::U8(v)) => {
            ImageBuffer::<Rgba<u8>, _>::from_raw(width, height, v).map(DynamicImage::ImageRgba8)
        }
        (ColorType::RGBA(16), DecodingResult::U16(v)) => {
            ImageBuffer::<Rgba<u16>, _>::from_raw(width, height, v)
                .map(DynamicImage::ImageRgba16)
        }
        (ColorType::CMYK(8), DecodingResult::U8(v)) => {
            ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, cmyk_to_rgb(&v))
                .map(DynamicImage::ImageRgb8)
        }
        (ColorType::Palette(bits @ (1 | 2 | 4 | 8)), DecodingResult::U8(packed)) => {
            let map = color_map.ok_or_else(|| "palette frame without colour map".to_string())?;
            let indices = if bits == 8 {
                packed
            } else {
                unpack_samples(&packed, width, height, bits)?
            };
            let rgb = expand_palette(&indices, map)?;
            ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, rgb).map(DynamicImage::ImageRgb8)
        }
        (other, _) => return Err(format!("unsupported TIFF colour type {other:?}")),
    };

    img.ok_or_else(size_mismatch)
}

/// Split rows of packed 1, 2 or 4-bit samples into one byte per sample.
/// Each row starts on a byte boundary, most significant bits first.
fn unpack_samples(
    packed: &[u8],
    width: u32,
    height: u32,
    bits: u8,
) -> std::result::Result<Vec<u8>, String> {
    let width = width as usize;
    let height = height as usize;
    let bits = usize::from(bits);
    let per_byte = 8 / bits;
    let row_bytes = (width * bits).div_ceil(8);
    if row_bytes == 0 || packed.len() < row_bytes * height {
        return Err(format!(
            "{} packed bytes for {width}x{height} at {bits} bits",
            packed.len()
        ));
    }

    let mask = ((1u16 << bits) - 1) as u8;
    let mut out = Vec::with_capacity(width * height);
    for row in packed.chunks_exact(row_bytes).take(height) {
        for x in 0..width {
            let shift = 8 - bits * (x % per_byte + 1);
            out.push((row[x / per_byte] >> shift) & mask);
        }
    }
    Ok(out)
}

/// Naive CMYK → RGB; scans rarely carry ICC-managed CMYK.
fn cmyk_to_rgb(cmyk: &[u8]) -> Vec<u8> {
    cmyk.chunks_exact(4)
        .flat_map(|px| {
            let k = 255 - px[3] as u16;
            [px[0], px[1], px[2]].map(|c| (((255 - c as u16) * k) / 255) as u8)
        })
        .collect()
}

/// TIFF colour maps store all reds, then all greens, then all blues, each as
/// 16-bit values.
fn expand_palette(indices: &[u8], color_map: &[u16]) -> std::result::Result<Vec<u8>, String> {
    if color_map.len() % 3 != 0 || color_map.is_empty() {
        return Err(format!("colour map length {} is not 3·n", color_map.len()));
    }
    let entries = color_map.len() / 3;
    let mut rgb = Vec::with_capacity(indices.len() * 3);
    for &i in indices {
        let i = i as usize;
        if i >= entries {
            return Err(format!("palette index {i} outside {entries}-entry colour map"));
        }
        rgb.push((color_map[i] >> 8) as u8);
        rgb.push((color_map[entries + i] >> 8) as u8);
        rgb.push((color_map[2 * entries + i] >> 8) as u8);
    }
    Ok(rgb)
}
