use std::env;

use anyhow::Result;

use backend::auth::password::hash_password;

/// Prints the argon2 hash for DASHBOARD_PASSWORD_HASH.
fn main() -> Result<()> {
    let Some(password) = env::args().nth(1) else {
        eprintln!("Usage: hash_password <password>");
        std::process::exit(1);
    };

    println!("{}", hash_password(&password)?);
    Ok(())
}
