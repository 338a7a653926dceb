/// Splits `items` into at most `n` contiguous chunks of `len / n` items, the
/// last chunk taking the remainder. Empty chunks are dropped.
pub fn partition_into_chunks<T: Clone>(items: &[T], n: usize) -> Vec<Vec<T>> {
    let n = n.max(1);
    let chunk_size = items.len() / n;
    (0..n)
        .map(|i| {
            let start = (i * chunk_size).min(items.len());
            let end = if i == n - 1 {
                items.len()
            } else {
                start + chunk_size
            };
            items[start..end].to_vec()
        })
        .filter(|chunk| !chunk.is_empty())
        .collect()
}
