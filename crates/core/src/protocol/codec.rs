//! Byte encoding of vector batches (client side)

/// Encoder for the vector batch wire format
///
/// `[count: u32] ([len: u32] [len x i32])*`, little-endian.
pub struct VectorCodec;

impl VectorCodec {
    /// Encode the batch header
    pub fn encode_count(count: u32) -> [u8; 4] {
        count.to_le_bytes()
    }

    /// Encode one vector as its length followed by its elements
    pub fn encode_vector(elements: &[i32]) -> Vec<u8> {
        let mut buf = Vec::with_capacity(4 + elements.len() * 4);
        buf.extend_from_slice(&(elements.len() as u32).to_le_bytes());
        for element in elements {
            buf.extend_from_slice(&element.to_le_bytes());
        }
        buf
    }

    /// Encode a whole batch, header included
    pub fn encode_batch(vectors: &[Vec<i32>]) -> Vec<u8> {
        let mut buf = Self::encode_count(vectors.len() as u32).to_vec();
        for vector in vectors {
            buf.extend_from_slice(&Self::encode_vector(vector));
        }
        buf
    }
}
