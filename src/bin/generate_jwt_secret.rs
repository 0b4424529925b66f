use base64::{engine::general_purpose::STANDARD, Engine as _};
use rand::RngCore;

/// Prints a fresh 256-bit signing secret, ready to paste into .env.
/// Rotating the secret invalidates every live access and refresh token.
fn main() {
    let mut key = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut key);

    println!("Add this to your .env file (keep it out of version control):");
    println!();
    println!("JWT_SECRET={}", STANDARD.encode(key));
}
