pub mod skipmap;

use rand::Rng;

/// Levels range over `[0, MAX_LEVEL]`.
pub const MAX_LEVEL: usize = 11;

/// Increase height with probability 1/4 per level.
fn rand_level() -> usize {
    let mut rng = rand::thread_rng();
    let mut level = 0;
    while level < MAX_LEVEL {
        let number = rng.gen_range(1..=4);
        if number == 1 {
            level += 1;
        } else {
            break;
        }
    }
    level
}
