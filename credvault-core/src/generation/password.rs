use crate::error::ValidationError;
use crate::generation::StringGenerationParameters;
use rand::seq::SliceRandom;
use rand::Rng;

pub const LOWERCASE: &str = "abcdefghijklmnopqrstuvwxyz";
pub const UPPERCASE: &str = "ABCDEFGHIJKLMNOPQRSTUVWXYZ";
pub const DIGITS: &str = "0123456789";
pub const SPECIAL: &str = "!\"#$%&'()*+,-./:;<=>?@[\\]^_`{|}~";

const SALT_ALPHABET: &str = "./0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const SALT_LENGTH: usize = 16;
const USERNAME_LENGTH: usize = 20;

fn character_classes(parameters: &StringGenerationParameters) -> Vec<Vec<char>> {
    let mut classes = Vec::new();
    if !parameters.exclude_lower {
        classes.push(LOWERCASE.chars().collect());
    }
    if !parameters.exclude_upper {
        classes.push(UPPERCASE.chars().collect());
    }
    if !parameters.exclude_number {
        classes.push(DIGITS.chars().collect());
    }
    if parameters.include_special {
        classes.push(SPECIAL.chars().collect());
    }
    classes
}

fn random_string(alphabet: &str, length: usize) -> String {
    let alphabet: Vec<char> = alphabet.chars().collect();
    let mut rng = rand::thread_rng();
    (0..length)
        .map(|_| alphabet[rng.gen_range(0..alphabet.len())])
        .collect()
}

/// Random password drawn from the enabled character classes. Every enabled
/// class contributes at least one character.
pub fn generate_password(parameters: &StringGenerationParameters) -> Result<String, ValidationError> {
    parameters.validate()?;

    let classes = character_classes(parameters);
    let pool: Vec<char> = classes.iter().flatten().copied().collect();
    let mut rng = rand::thread_rng();

    let mut password: Vec<char> = classes
        .iter()
        .filter_map(|class| class.choose(&mut rng).copied())
        .collect();
    while password.len() < parameters.length {
        password.push(pool[rng.gen_range(0..pool.len())]);
    }
    password.shuffle(&mut rng);

    Ok(password.into_iter().collect())
}

/// Twenty random lowercase letters
pub fn generate_username() -> String {
    random_string(LOWERCASE, USERNAME_LENGTH)
}

/// Crypt-style salt for user credentials
pub fn generate_salt() -> String {
    random_string(SALT_ALPHABET, SALT_LENGTH)
}
