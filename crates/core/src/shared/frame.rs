use ndarray::{ArrayView3, ArrayViewMut3};

use crate::shared::bbox::PixelRect;

/// A single camera frame: contiguous RGB bytes in row-major order.
///
/// Format conversion happens at I/O boundaries only; the domain layer
/// treats pixel data as opaque.
#[derive(Clone, Debug)]
pub struct Frame {
    data: Vec<u8>,
    width: u32,
    height: u32,
    channels: u8,
    index: usize,
}

impl Frame {
    pub fn new(data: Vec<u8>, width: u32, height: u32, channels: u8, index: usize) -> Self {
        debug_assert_eq!(
            data.len(),
            (width as usize) * (height as usize) * (channels as usize),
            "data length must equal width * height * channels"
        );
        Self {
            data,
            width,
            height,
            channels,
            index,
        }
    }

    /// Solid black RGB frame, mostly useful for fakes and tests.
    pub fn blank(width: u32, height: u32, index: usize) -> Self {
        let len = width as usize * height as usize * 3;
        Self::new(vec![0u8; len], width, height, 3, index)
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u8 {
        self.channels
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn as_ndarray(&self) -> ArrayView3<'_, u8> {
        ArrayView3::from_shape(self.shape(), &self.data)
            .expect("Frame data length must match dimensions")
    }

    pub fn as_ndarray_mut(&mut self) -> ArrayViewMut3<'_, u8> {
        ArrayViewMut3::from_shape(self.shape(), &mut self.data)
            .expect("Frame data length must match dimensions")
    }

    /// Copies the pixels inside `rect` into a new frame.
    ///
    /// Returns `None` when the rectangle is empty or does not fit inside
    /// this frame; callers are expected to clamp first.
    pub fn crop(&self, rect: &PixelRect) -> Option<Frame> {
        if rect.width == 0 || rect.height == 0 {
            return None;
        }
        if rect.x + rect.width > self.width || rect.y + rect.height > self.height {
            return None;
        }

        let ch = self.channels as usize;
        let src_stride = self.width as usize * ch;
        let row_len = rect.width as usize * ch;
        let mut data = Vec::with_capacity(row_len * rect.height as usize);
        for row in rect.y as usize..(rect.y + rect.height) as usize {
            let start = row * src_stride + rect.x as usize * ch;
            data.extend_from_slice(&self.data[start..start + row_len]);
        }

        Some(Frame::new(
            data,
            rect.width,
            rect.height,
            self.channels,
            self.index,
        ))
    }

    /// Surrounds the frame with a black border of `pad` pixels on every side.
    pub fn pad(&self, pad: u32) -> Frame {
        let ch = self.channels as usize;
        let new_w = self.width + 2 * pad;
        let new_h = self.height + 2 * pad;
        let dst_stride = new_w as usize * ch;
        let src_stride = self.width as usize * ch;
        let mut data = vec![0u8; dst_stride * new_h as usize];

        for row in 0..self.height as usize {
            let src = row * src_stride;
            let dst = (row + pad as usize) * dst_stride + pad as usize * ch;
            data[dst..dst + src_stride].copy_from_slice(&self.data[src..src + src_stride]);
        }

        Frame::new(data, new_w, new_h, self.channels, self.index)
    }

    fn shape(&self) -> (usize, usize, usize) {
        (
            self.height as usize,
            self.width as usize,
            self.channels as usize,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> Frame {
        let mut data = Vec::with_capacity((width * height * 3) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 7]);
            }
        }
        Frame::new(data, width, height, 3, 0)
    }

    #[test]
    fn test_construction_and_accessors() {
        let data = vec![0u8; 12]; // 2x2x3
        let frame = Frame::new(data.clone(), 2, 2, 3, 5);
        assert_eq!(frame.width(), 2);
        assert_eq!(frame.height(), 2);
        assert_eq!(frame.channels(), 3);
        assert_eq!(frame.index(), 5);
        assert_eq!(frame.data(), &data[..]);
    }

    #[test]
    #[should_panic(expected = "data length must equal width * height * channels")]
    fn test_mismatched_data_length_panics_in_debug() {
        Frame::new(vec![0u8; 10], 2, 2, 3, 0);
    }

    #[test]
    fn test_as_ndarray_shape() {
        let frame = Frame::blank(4, 2, 0);
        assert_eq!(frame.as_ndarray().shape(), &[2, 4, 3]);
    }

    #[test]
    fn test_as_ndarray_mut_modification() {
        let mut frame = Frame::blank(2, 2, 0);
        frame.as_ndarray_mut()[[0, 1, 2]] = 128;
        assert_eq!(frame.as_ndarray()[[0, 1, 2]], 128);
    }

    #[test]
    fn test_crop_copies_requested_window() {
        let frame = gradient(10, 8);
        let rect = PixelRect {
            x: 2,
            y: 3,
            width: 4,
            height: 2,
        };
        let crop = frame.crop(&rect).unwrap();

        assert_eq!(crop.width(), 4);
        assert_eq!(crop.height(), 2);
        let arr = crop.as_ndarray();
        assert_eq!(arr[[0, 0, 0]], 2); // x of source column 2
        assert_eq!(arr[[0, 0, 1]], 3); // y of source row 3
        assert_eq!(arr[[1, 3, 0]], 5);
        assert_eq!(arr[[1, 3, 1]], 4);
    }

    #[test]
    fn test_crop_empty_rect_is_none() {
        let frame = gradient(10, 8);
        let rect = PixelRect {
            x: 2,
            y: 3,
            width: 0,
            height: 2,
        };
        assert!(frame.crop(&rect).is_none());
    }

    #[test]
    fn test_crop_out_of_bounds_is_none() {
        let frame = gradient(10, 8);
        let rect = PixelRect {
            x: 8,
            y: 0,
            width: 4,
            height: 2,
        };
        assert!(frame.crop(&rect).is_none());
    }

    #[test]
    fn test_pad_adds_black_border() {
        let mut frame = Frame::blank(2, 2, 3);
        frame.data_mut().fill(200);

        let padded = frame.pad(1);
        assert_eq!(padded.width(), 4);
        assert_eq!(padded.height(), 4);
        assert_eq!(padded.index(), 3);
        let arr = padded.as_ndarray();
        assert_eq!(arr[[0, 0, 0]], 0);
        assert_eq!(arr[[1, 1, 0]], 200);
        assert_eq!(arr[[2, 2, 2]], 200);
        assert_eq!(arr[[3, 3, 1]], 0);
    }
}
