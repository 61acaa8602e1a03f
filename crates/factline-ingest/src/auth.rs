/// Constant-time comparison: no early exit on the first mismatching byte, so
/// timing does not leak how many leading bytes of a guess were correct.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

/// `configured == None` disables auth entirely (every request passes).
pub fn verify(configured: &Option<String>, provided: Option<&str>) -> bool {
    match configured {
        None => true,
        Some(expected) => match provided {
            Some(got) => constant_time_eq(expected.as_bytes(), got.as_bytes()),
            None => false,
        },
    }
}
