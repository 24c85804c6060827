/// Linearly interpolates `input` from `native_rate` to `target_rate`.
///
/// The output holds `round(len * target / native)` samples; sample `i` is read
/// at source position `i * native / target`, with the upper neighbour clamped
/// to the last input sample. Equal rates return an exact copy, and an unknown
/// (zero) native rate is passed through unchanged.
pub fn resample(input: &[f32], native_rate: u32, target_rate: u32) -> Vec<f32> {
    if native_rate == target_rate || native_rate == 0 {
        return input.to_vec();
    }
    if input.is_empty() {
        return Vec::new();
    }

    let ratio = f64::from(target_rate) / f64::from(native_rate);
    let output_len = (input.len() as f64 * ratio).round() as usize;
    let last = input.len() - 1;
    let mut output = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let position = i as f64 / ratio;
        let lower = position.floor() as usize;
        if lower >= last {
            output.push(input[last]);
            continue;
        }
        let frac = (position - lower as f64) as f32;
        let a = input[lower];
        let b = input[lower + 1];
        output.push(a + (b - a) * frac);
    }

    output
}

/// Concatenates `chunks` in order into one buffer.
pub fn merge_chunks<B: AsRef<[f32]>>(chunks: &[B]) -> Vec<f32> {
    let total = chunks.iter().map(|chunk| chunk.as_ref().len()).sum();
    let mut merged = Vec::with_capacity(total);
    for chunk in chunks {
        merged.extend_from_slice(chunk.as_ref());
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: &[f32], expected: &[f32]) {
        assert_eq!(actual.len(), expected.len(), "{:?} vs {:?}", actual, expected);
        for (a, e) in actual.iter().zip(expected) {
            assert!((a - e).abs() < 1e-6, "{:?} vs {:?}", actual, expected);
        }
    }

    #[test]
    fn equal_rates_are_identity() {
        let input = vec![0.1f32, -0.7, 0.333_333, 1.0];
        assert_eq!(resample(&input, 16_000, 16_000), input);
        assert!(resample(&[], 16_000, 16_000).is_empty());
    }

    #[test]
    fn empty_input_gives_empty_output() {
        assert!(resample(&[], 48_000, 16_000).is_empty());
        assert!(resample(&[], 8_000, 16_000).is_empty());
    }

    #[test]
    fn upsampling_clamps_tail() {
        let output = resample(&[1.0, 0.0], 8_000, 16_000);
        assert_close(&output, &[1.0, 0.5, 0.0, 0.0]);
    }

    #[test]
    fn downsampling_length_follows_ratio() {
        for (len, native) in [(4800usize, 48_000u32), (4410, 44_100), (1001, 22_050), (7, 48_000)] {
            let input: Vec<f32> = (0..len).map(|i| (i as f32 * 0.01).sin()).collect();
            let output = resample(&input, native, 16_000);
            let expected = (len as f64 * 16_000.0 / f64::from(native)).round() as i64;
            assert!((output.len() as i64 - expected).abs() <= 1, "len {} native {}", len, native);
        }
    }

    #[test]
    fn interior_samples_stay_between_neighbours() {
        let input: Vec<f32> = (0..441).map(|i| ((i * 37 % 200) as f32 / 100.0) - 1.0).collect();
        let output = resample(&input, 44_100, 16_000);
        let step = 44_100.0 / 16_000.0;
        for (i, value) in output.iter().enumerate() {
            let position = i as f64 * step;
            let lower = (position.floor() as usize).min(input.len() - 1);
            let upper = (lower + 1).min(input.len() - 1);
            let lo = input[lower].min(input[upper]);
            let hi = input[lower].max(input[upper]);
            assert!(*value >= lo - 1e-6 && *value <= hi + 1e-6, "sample {} = {}", i, value);
        }
    }

    #[test]
    fn downsampling_a_ramp_reads_source_positions() {
        let input: Vec<f32> = (0..12).map(|i| i as f32).collect();
        let output = resample(&input, 48_000, 16_000);
        assert_close(&output, &[0.0, 3.0, 6.0, 9.0]);
    }

    #[test]
    fn zero_native_rate_passes_through() {
        assert_eq!(resample(&[0.5, 0.25], 0, 16_000), vec![0.5, 0.25]);
    }

    #[test]
    fn merge_concatenates_in_order() {
        let merged = merge_chunks(&[vec![1.0, -1.0, 0.5], vec![0.25]]);
        assert_eq!(merged, vec![1.0, -1.0, 0.5, 0.25]);
    }

    #[test]
    fn merge_lengths_add_up() {
        let chunks = vec![vec![0.0; 3], vec![0.0; 0], vec![0.0; 11], vec![0.0; 5]];
        assert_eq!(merge_chunks(&chunks).len(), 19);
        assert!(merge_chunks::<Vec<f32>>(&[]).is_empty());
    }

    #[test]
    fn split_then_merge_round_trips() {
        let original: Vec<f32> = (0..100).map(|i| i as f32 / 100.0).collect();
        let pieces: Vec<&[f32]> = vec![&original[..13], &original[13..50], &original[50..]];
        assert_eq!(merge_chunks(&pieces), original);
    }
}
