use std::fmt;

use crate::{cpf, IdentityError, IdentityResult};

/// What a driver types into the login field.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Identifier {
    /// lowercased and trimmed
    Email(String),
    /// digits only
    Cpf(String),
}

impl Identifier {
    /// Anything containing `@` is an email, everything else must be a valid
    /// CPF.
    pub fn parse(input: &str) -> IdentityResult<Self> {
        let input = input.trim();
        if input.is_empty() {
            return Err(IdentityError::MissingFields);
        }
        if input.contains('@') {
            Ok(Self::Email(input.to_lowercase()))
        } else if cpf::validate(input) {
            Ok(Self::Cpf(cpf::clean(input)))
        } else {
            Err(IdentityError::InvalidCpf)
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Email(email) => f.write_str(email),
            Self::Cpf(digits) => f.write_str(&cpf::format(digits)),
        }
    }
}
