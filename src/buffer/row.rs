use std::fmt;

/// A contiguous `f32` buffer split into rows of possibly different sizes.
///
/// Used for per-layer activations of a forward pass and for per-layer
/// parameter gradients, where row `i` belongs to layer `i`.
#[derive(Clone, PartialEq)]
pub struct RowBuffer {
    buffer: Box<[f32]>,
    row_offsets_and_sizes: Box<[(usize, usize)]>,
}

impl fmt::Debug for RowBuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> Result<(), fmt::Error> {
        let mut s = f.debug_struct("RowBuffer");
        if self.buffer.len() < 30 {
            s.field("buffer", &self.buffer);
        } else {
            s.field("buffer_len", &self.buffer.len());
        }
        s.field("row_offsets_and_sizes", &self.row_offsets_and_sizes)
            .finish()
    }
}

impl RowBuffer {

    pub fn new_with_row_sizes(initial_value: f32, row_sizes: impl AsRef<[usize]>) -> Self {
        let row_sizes = row_sizes.as_ref();
        assert!(row_sizes.len() > 0);
        let total_size: usize = row_sizes.iter().sum();
        let mut row_offsets_and_sizes: Vec<(usize, usize)> = Vec::with_capacity(row_sizes.len());
        let mut offset: usize = 0;
        for &size in row_sizes {
            row_offsets_and_sizes.push((offset, size));
            offset += size;
        }
        RowBuffer {
            buffer: vec![initial_value; total_size].into_boxed_slice(),
            row_offsets_and_sizes: row_offsets_and_sizes.into_boxed_slice()
        }
    }

    #[inline]
    pub fn get_row(&self, row: usize) -> &[f32] {
        let (offset, size) = self.row_offsets_and_sizes[row];
        &self.buffer[offset..offset + size]
    }

    #[inline]
    pub fn get_row_mut(&mut self, row: usize) -> &mut [f32] {
        let (offset, size) = self.row_offsets_and_sizes[row];
        &mut self.buffer[offset..offset + size]
    }

    /// Borrows row `row` immutably and row `row + 1` mutably, the shape of
    /// one layer's input and output during a forward pass.
    #[inline]
    pub fn split_adjacent_rows(&mut self, row: usize) -> (&[f32], &mut [f32]) {
        let (offset_first, size_first) = self.row_offsets_and_sizes[row];
        let (offset_second, size_second) = self.row_offsets_and_sizes[row + 1];
        let (head, tail) = self.buffer.split_at_mut(offset_second);
        (&head[offset_first..offset_first + size_first], &mut tail[..size_second])
    }

    #[inline]
    pub fn num_rows(&self) -> usize {
        self.row_offsets_and_sizes.len()
    }

    #[inline]
    pub fn get_last_row(&self) -> &[f32] {
        self.get_row(self.num_rows() - 1)
    }

    pub fn reset_to(&mut self, value: f32) {
        for element in self.buffer.iter_mut() {
            *element = value;
        }
    }

    #[inline]
    pub fn buffer_len(&self) -> usize {
        self.buffer.len()
    }

    #[inline]
    pub fn get_buffer(&self) -> &[f32] {
        &self.buffer
    }

    #[inline]
    pub fn get_buffer_mut(&mut self) -> &mut [f32] {
        &mut self.buffer
    }

    pub fn add_with_multiplier(&mut self, other: &RowBuffer, multiplier: f32) {
        assert_eq!(self.buffer.len(), other.buffer.len());
        for (element, other) in self.buffer.iter_mut().zip(other.buffer.iter()) {
            *element += *other * multiplier;
        }
    }

    pub fn scale(&mut self, multiplier: f32) {
        for element in self.buffer.iter_mut() {
            *element *= multiplier;
        }
    }

    pub fn norm_squared(&self) -> f32 {
        self.buffer.iter().map(|v| v * v).sum()
    }

    pub fn norm(&self) -> f32 {
        self.norm_squared().sqrt()
    }

}


#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_row_sizes_types() {
        RowBuffer::new_with_row_sizes(0f32, vec![1, 2, 3]);
        RowBuffer::new_with_row_sizes(0f32, &vec![1, 2, 3]);
        RowBuffer::new_with_row_sizes(0f32, [1, 2, 3]);
        RowBuffer::new_with_row_sizes(0f32, &[1, 2, 3]);
    }

    #[test]
    #[should_panic(expected = "assertion failed: row_sizes.len() > 0")]
    fn test_empty_not_allowed() {
        RowBuffer::new_with_row_sizes(0f32, Vec::new());
    }

    #[test]
    fn test_basics() {

        let mut buf = RowBuffer::new_with_row_sizes(0.0, vec![1, 0, 10, 2]);

        assert_eq!(4, buf.num_rows());
        assert_eq!(1, buf.get_row(0).len());
        assert_eq!(0, buf.get_row(1).len());
        assert_eq!(10, buf.get_row_mut(2).len());
        assert_eq!(2, buf.get_last_row().len());

        for i in 0..buf.num_rows() {
            let row = buf.get_row_mut(i);
            for j in 0..row.len() {
                row[j] = (i * 10 + j) as f32;
            }
        }

        let buf2 = buf.clone();
        buf.add_with_multiplier(&buf2, 2.0);
        for i in 0..buf.num_rows() {
            let row = buf.get_row(i);
            for j in 0..row.len() {
                assert_eq!(row[j], ((i * 10 + j) * 3) as f32);
            }
        }

        buf.add_with_multiplier(&buf2, -1.0);
        buf.scale(0.5);
        for i in 0..buf.num_rows() {
            let row = buf.get_row(i);
            for j in 0..row.len() {
                assert_eq!(row[j], (i * 10 + j) as f32);
            }
        }

        assert_eq!(buf, buf2);

        let mut buf3 = RowBuffer::new_with_row_sizes(1.0, vec![1, 0, 10, 2]);
        buf3.reset_to(2.0);
        assert_eq!(buf3.norm_squared(), 13.0 * 4.0);
    }

    #[test]
    fn test_split_adjacent_rows() {
        let mut buf = RowBuffer::new_with_row_sizes(0.0, vec![3, 2]);
        buf.get_row_mut(0).copy_from_slice(&[1.0, 2.0, 3.0]);
        {
            let (input, output) = buf.split_adjacent_rows(0);
            output[0] = input.iter().sum();
            output[1] = input[2];
        }
        assert_eq!(buf.get_last_row(), &[6.0, 3.0]);
    }

}
