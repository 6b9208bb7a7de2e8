//! Brazilian individual taxpayer numbers (CPF).

/// Digits of `cpf`, everything else removed.
pub fn clean(cpf: &str) -> String {
    cpf.chars().filter(char::is_ascii_digit).collect()
}

fn check_digit(digits: &[u32]) -> u32 {
    let weight = digits.len() as u32 + 1;
    let sum: u32 = digits
        .iter()
        .enumerate()
        .map(|(i, digit)| digit * (weight - i as u32))
        .sum();
    match 11 - sum % 11 {
        digit if digit > 9 => 0,
        digit => digit,
    }
}

/// Checks length, rejects repeated digits and verifies both check digits.
/// Punctuation is ignored.
pub fn validate(cpf: &str) -> bool {
    let digits: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != 11 {
        return false;
    }
    if digits.iter().all(|digit| *digit == digits[0]) {
        return false;
    }
    check_digit(&digits[..9]) == digits[9] && check_digit(&digits[..10]) == digits[10]
}

/// `XXX.XXX.XXX-XX`, partially for incomplete input. Digits beyond the
/// eleventh are dropped.
pub fn format(cpf: &str) -> String {
    let digits = clean(cpf);
    let mut formatted = String::with_capacity(14);
    for (i, digit) in digits.chars().take(11).enumerate() {
        match i {
            3 | 6 => formatted.push('.'),
            9 => formatted.push('-'),
            _ => {}
        }
        formatted.push(digit);
    }
    formatted
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_numbers() {
        assert!(validate("529.982.247-25"));
        assert!(validate("52998224725"));
        assert!(validate("  529 982 247 25 "));
        assert!(validate("111.444.777-35"));
        // check digits computing to 10 and 11 become 0
        assert!(validate("123.456.789-09"));
        assert!(validate("987.654.321-00"));
    }

    #[test]
    fn invalid_numbers() {
        assert!(!validate("111.111.111-11"));
        assert!(!validate("529.982.247-24"));
        assert!(!validate("529.982.247-15"));
        assert!(!validate("5299822472"));
        assert!(!validate("529982247255"));
        assert!(!validate(""));
    }

    #[test]
    fn formatting() {
        assert_eq!(format("52998224725"), "529.982.247-25");
        assert_eq!(format("529.982.247-25"), "529.982.247-25");
        assert_eq!(format("5299"), "529.9");
        assert_eq!(format("529982247"), "529.982.247");
        assert_eq!(format("5299822472599"), "529.982.247-25");
        assert_eq!(clean("529.982.247-25"), "52998224725");
    }
}
