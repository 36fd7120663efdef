use crate::config::{Number, EPSILON};
use wide::f32x8;

fn lanes(chunk: &[Number]) -> f32x8 {
    f32x8::new([
        chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
    ])
}

/// Squared Euclidean distance using SIMD operations.
/// Returns `None` when the vectors differ in length.
pub fn squared_euclidean_simd(a: &[Number], b: &[Number]) -> Option<Number> {
    if a.len() != b.len() {
        return None;
    }

    let a_chunks = a.chunks_exact(8);
    let b_chunks = b.chunks_exact(8);
    let a_rest = a_chunks.remainder();
    let b_rest = b_chunks.remainder();

    let mut sum = f32x8::splat(0.0);
    for (ca, cb) in a_chunks.zip(b_chunks) {
        let diff = lanes(ca) - lanes(cb);
        sum += diff * diff;
    }

    let mut total = sum.reduce_add();
    for (x, y) in a_rest.iter().zip(b_rest) {
        let d = x - y;
        total += d * d;
    }

    Some(total)
}

pub fn normalize_vector(vector: &mut [Number]) {
    let magnitude: Number = vector.iter().map(|&x| x * x).sum::<Number>().sqrt();
    if magnitude > EPSILON {
        for x in vector.iter_mut() {
            *x /= magnitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn scalar(a: &[Number], b: &[Number]) -> Number {
        a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum()
    }

    #[test]
    fn test_squared_euclidean_matches_scalar() {
        let mut rng = rand::thread_rng();
        for len in [1, 7, 8, 9, 16, 100, 384] {
            let a: Vec<Number> = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let b: Vec<Number> = (0..len).map(|_| rng.gen_range(-1.0..1.0)).collect();
            let simd = squared_euclidean_simd(&a, &b).unwrap();
            assert!((simd - scalar(&a, &b)).abs() < 1e-3, "len {}", len);
        }
    }

    #[test]
    fn test_squared_euclidean_identical_is_zero() {
        let v = vec![0.25; 19];
        assert_eq!(squared_euclidean_simd(&v, &v), Some(0.0));
    }

    #[test]
    fn test_squared_euclidean_length_mismatch() {
        assert_eq!(squared_euclidean_simd(&[1.0, 2.0], &[1.0]), None);
    }

    #[test]
    fn test_normalize_vector() {
        let mut v = vec![3.0, 4.0];
        normalize_vector(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0; 4];
        normalize_vector(&mut zero);
        assert_eq!(zero, vec![0.0; 4]);
    }
}
