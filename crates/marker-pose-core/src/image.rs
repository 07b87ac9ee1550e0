use serde::{Deserialize, Serialize};

/// Borrowed 8-bit grayscale image, row-major with `len = width * height`.
#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8],
}

#[derive(Clone, Debug)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    /// Image of the given size filled with a constant value.
    pub fn filled(width: usize, height: usize, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }
}

/// Pixel layout of an incoming camera buffer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    #[default]
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
    Gray8,
}

impl PixelFormat {
    #[inline]
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }

    /// Byte offsets of the (R, G, B) channels inside one pixel.
    #[inline]
    fn rgb_offsets(self) -> [usize; 3] {
        match self {
            PixelFormat::Rgb8 | PixelFormat::Rgba8 => [0, 1, 2],
            PixelFormat::Bgr8 | PixelFormat::Bgra8 => [2, 1, 0],
            PixelFormat::Gray8 => [0, 0, 0],
        }
    }
}

/// Reasons a camera buffer cannot be interpreted with its declared layout.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ImageLayoutError {
    #[error("image has zero size ({width}x{height})")]
    Empty { width: usize, height: usize },
    #[error("stride {stride} is smaller than one row ({min} bytes)")]
    StrideTooSmall { stride: usize, min: usize },
    #[error("buffer holds {got} bytes, layout needs {expected}")]
    BufferTooSmall { expected: usize, got: usize },
    #[error("declared layout {width}x{height} (stride {stride}) overflows the address space")]
    Overflow {
        width: usize,
        height: usize,
        stride: usize,
    },
}

/// Borrowed camera buffer with an explicit row stride.
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    pub width: usize,
    pub height: usize,
    /// Bytes per row, `>= width * format.bytes_per_pixel()`.
    pub stride: usize,
    pub format: PixelFormat,
    pub data: &'a [u8],
}

impl<'a> ImageView<'a> {
    /// Tightly packed buffer (`stride = width * bytes_per_pixel`).
    pub fn packed(width: usize, height: usize, format: PixelFormat, data: &'a [u8]) -> Self {
        Self {
            width,
            height,
            stride: width.saturating_mul(format.bytes_per_pixel()),
            format,
            data,
        }
    }

    /// Check that the declared layout fits inside `data`.
    pub fn validate(&self) -> Result<(), ImageLayoutError> {
        if self.width == 0 || self.height == 0 {
            return Err(ImageLayoutError::Empty {
                width: self.width,
                height: self.height,
            });
        }
        let overflow = || ImageLayoutError::Overflow {
            width: self.width,
            height: self.height,
            stride: self.stride,
        };
        let row = self
            .width
            .checked_mul(self.format.bytes_per_pixel())
            .ok_or_else(overflow)?;
        if self.stride < row {
            return Err(ImageLayoutError::StrideTooSmall {
                stride: self.stride,
                min: row,
            });
        }
        let expected = self
            .stride
            .checked_mul(self.height - 1)
            .and_then(|n| n.checked_add(row))
            .ok_or_else(overflow)?;
        if self.data.len() < expected {
            return Err(ImageLayoutError::BufferTooSmall {
                expected,
                got: self.data.len(),
            });
        }
        Ok(())
    }

    /// Convert to a packed grayscale image (BT.601 integer luma weights).
    pub fn to_gray(&self) -> Result<GrayImage, ImageLayoutError> {
        self.validate()?;

        let bpp = self.format.bytes_per_pixel();
        let mut out = Vec::with_capacity(self.width * self.height);
        if self.format == PixelFormat::Gray8 {
            for y in 0..self.height {
                let start = y * self.stride;
                out.extend_from_slice(&self.data[start..start + self.width]);
            }
        } else {
            let [ro, go, bo] = self.format.rgb_offsets();
            for y in 0..self.height {
                let row = &self.data[y * self.stride..y * self.stride + self.width * bpp];
                for px in row.chunks_exact(bpp) {
                    let r = px[ro] as u32;
                    let g = px[go] as u32;
                    let b = px[bo] as u32;
                    out.push(((77 * r + 150 * g + 29 * b + 128) >> 8) as u8);
                }
            }
        }

        Ok(GrayImage {
            width: self.width,
            height: self.height,
            data: out,
        })
    }
}

/// Owned camera buffer, used to move frames across threads.
#[derive(Clone, Debug)]
pub struct OwnedImage {
    pub width: usize,
    pub height: usize,
    pub stride: usize,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl OwnedImage {
    pub fn packed(width: usize, height: usize, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width.saturating_mul(format.bytes_per_pixel()),
            format,
            data,
        }
    }

    /// Expand a grayscale image into a packed RGB buffer.
    pub fn rgb_from_gray(gray: &GrayImage) -> Self {
        let mut data = Vec::with_capacity(gray.data.len() * 3);
        for &v in &gray.data {
            data.extend_from_slice(&[v, v, v]);
        }
        Self::packed(gray.width, gray.height, PixelFormat::Rgb8, data)
    }

    #[inline]
    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
            data: &self.data,
        }
    }
}

#[inline]
pub fn get_gray(src: &GrayImageView<'_>, x: i32, y: i32) -> u8 {
    if x < 0 || y < 0 || x >= src.width as i32 || y >= src.height as i32 {
        return 0;
    }
    src.data[y as usize * src.width + x as usize]
}

#[inline]
pub fn sample_bilinear(src: &GrayImageView<'_>, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = get_gray(src, x0, y0) as f32;
    let p10 = get_gray(src, x0 + 1, y0) as f32;
    let p01 = get_gray(src, x0, y0 + 1) as f32;
    let p11 = get_gray(src, x0 + 1, y0 + 1) as f32;

    let a = p00 + fx * (p10 - p00);
    let b = p01 + fx * (p11 - p01);
    a + fy * (b - a)
}
