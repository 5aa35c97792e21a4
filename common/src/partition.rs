use std::hash::Hasher;

use fnv::FnvHasher;

/// Hash FNV-1a de la clave, recortado a 31 bits para que sea no negativo.
/// Es estable entre procesos y versiones del compilador (a diferencia de
/// `DefaultHasher`), cosa necesaria porque el map y el reduce de una misma
/// clave corren en workers distintos.
pub fn ihash(key: &str) -> u32 {
    let mut h = FnvHasher::default();
    h.write(key.as_bytes());
    (h.finish() & 0x7fff_ffff) as u32
}

/// Bucket (índice de reduce) al que va una clave: `ihash(key) % n_reduce`.
/// `n_reduce` tiene que ser >= 1; el executor de map lo valida antes.
pub fn bucket(key: &str, n_reduce: usize) -> usize {
    debug_assert!(n_reduce > 0, "n_reduce debe ser >= 1");
    ihash(key) as usize % n_reduce
}
