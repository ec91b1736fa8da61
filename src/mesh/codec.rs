use crate::coherence::{Score, Signal};
use crate::core::error::{MeshError, MeshResult};

/// Decoded wire message: one score byte followed by one byte per sample.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub score: Score,
    pub signal: Signal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameCodec {
    signal_len: usize,
}

impl FrameCodec {
    pub fn new(signal_len: usize) -> Self {
        Self { signal_len }
    }

    pub fn frame_len(&self) -> usize {
        1 + self.signal_len
    }

    pub fn encode(&self, score: Score, signal: &Signal) -> MeshResult<Vec<u8>> {
        if signal.len() != self.signal_len {
            return Err(MeshError::LengthMismatch {
                expected: self.signal_len,
                actual: signal.len(),
            });
        }

        let mut buf = Vec::with_capacity(self.frame_len());
        buf.push(score.to_byte());
        buf.extend(signal.samples().iter().map(|&s| sample_to_byte(s)));
        Ok(buf)
    }

    /// Bytes past the frame length are ignored.
    pub fn decode(&self, bytes: &[u8]) -> MeshResult<Frame> {
        if bytes.len() < self.frame_len() {
            return Err(MeshError::MalformedMessage {
                expected: self.frame_len(),
                actual: bytes.len(),
            });
        }

        let score = Score::from_byte(bytes[0]);
        let samples = bytes[1..self.frame_len()]
            .iter()
            .map(|&b| b as f64 / 255.0)
            .collect();

        Ok(Frame {
            score,
            signal: Signal::new(samples),
        })
    }
}

fn sample_to_byte(sample: f64) -> u8 {
    if sample.is_nan() {
        return 0;
    }
    (sample.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_layout() {
        let codec = FrameCodec::new(4);
        let bytes = codec
            .encode(Score::ONE, &Signal::new(vec![0.0, 1.0, 0.5, 2.0]))
            .unwrap();
        assert_eq!(bytes, vec![255, 0, 255, 128, 255]);
    }

    #[test]
    fn test_default_frame_is_65_bytes() {
        let codec = FrameCodec::new(64);
        assert_eq!(codec.frame_len(), 65);
        let bytes = codec.encode(Score::ONE, &Signal::filled(64, 1.0)).unwrap();
        assert_eq!(bytes.len(), 65);

        let frame = codec.decode(&bytes).unwrap();
        assert_eq!(frame.score, Score::ONE);
        assert_eq!(frame.signal, Signal::filled(64, 1.0));
    }

    #[test]
    fn test_short_frame_is_malformed() {
        let codec = FrameCodec::new(64);
        let err = codec.decode(&[0u8; 10]).unwrap_err();
        assert_eq!(
            err,
            MeshError::MalformedMessage {
                expected: 65,
                actual: 10
            }
        );
    }

    #[test]
    fn test_trailing_bytes_ignored() {
        let codec = FrameCodec::new(2);
        let frame = codec.decode(&[0, 255, 0, 77, 77]).unwrap();
        assert_eq!(frame.score, Score::ZERO);
        assert_eq!(frame.signal.samples(), &[1.0, 0.0]);
    }

    #[test]
    fn test_encode_wrong_length() {
        let codec = FrameCodec::new(64);
        assert!(matches!(
            codec.encode(Score::ONE, &Signal::filled(3, 1.0)),
            Err(MeshError::LengthMismatch { expected: 64, actual: 3 })
        ));
    }
}
