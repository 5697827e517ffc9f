//! Credential selection
//!
//! Each polling entity carries a set of contributed API keys; picking one
//! at random per cycle spreads the rate-limit cost across contributors.

use rand::seq::SliceRandom;

/// Pick one usable key. `None` means the entity has no keys and the
/// caller skips it for the cycle.
pub fn pick_credential(keys: &[String]) -> Option<&str> {
    let usable: Vec<&String> = keys.iter().filter(|k| !k.is_empty()).collect();
    usable.choose(&mut rand::thread_rng()).map(|k| k.as_str())
}
