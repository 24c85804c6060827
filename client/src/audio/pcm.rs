/// Decodes signed 16-bit little-endian PCM into normalized floats.
/// A trailing odd byte is ignored.
pub fn pcm16le_to_f32(bytes: &[u8]) -> Vec<f32> {
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    samples.extend(
        bytes
            .chunks_exact(2)
            .map(|pair| f32::from(i16::from_le_bytes([pair[0], pair[1]])) / 32768.0),
    );
    samples
}

/// Appends `data` to `out` as mono, averaging interleaved channels.
pub fn append_downmixed<T: Copy>(
    out: &mut Vec<f32>,
    data: &[T],
    channels: usize,
    to_f32: impl Fn(T) -> f32,
) {
    if channels <= 1 {
        out.extend(data.iter().map(|&sample| to_f32(sample)));
        return;
    }

    out.reserve(data.len() / channels);
    for frame in data.chunks_exact(channels) {
        let sum: f32 = frame.iter().map(|&sample| to_f32(sample)).sum();
        out.push(sum / channels as f32);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_extremes_and_zero() {
        let bytes = [
            0xff, 0x7f, // 32767
            0x00, 0x80, // -32768
            0x00, 0x00, // 0
        ];
        let samples = pcm16le_to_f32(&bytes);
        assert_eq!(samples.len(), 3);
        assert!((samples[0] - 0.999_97).abs() < 1e-5);
        assert_eq!(samples[1], -1.0);
        assert_eq!(samples[2], 0.0);
    }

    #[test]
    fn ten_millisecond_frame_is_160_samples() {
        assert_eq!(pcm16le_to_f32(&[0u8; 320]).len(), 160);
        assert_eq!(pcm16le_to_f32(&[0u8; 40]).len(), 20);
    }

    #[test]
    fn odd_trailing_byte_is_dropped() {
        let samples = pcm16le_to_f32(&[0x00, 0x40, 0x12]);
        assert_eq!(samples, vec![0.5]);
    }

    #[test]
    fn downmixes_stereo() {
        let mut out = Vec::new();
        append_downmixed(&mut out, &[1.0f32, -1.0, 0.5, 0.5], 2, |s| s);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn mono_is_copied() {
        let mut out = vec![0.9];
        append_downmixed(&mut out, &[0.1f32, 0.2], 1, |s| s);
        assert_eq!(out, vec![0.9, 0.1, 0.2]);
    }
}
