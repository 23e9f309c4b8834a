//! CPF helpers shared by the certificate pipeline.

/// Strips everything but digits, e.g. "123.456.789-09" -> "12345678909".
pub fn normalize(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Mod-11 check-digit validation over an already-normalized CPF.
/// Rejects anything that is not 11 digits or is a single repeated digit.
pub fn is_valid(cpf: &str) -> bool {
    if cpf.len() != 11 || !cpf.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.iter().all(|&d| d == digits[0]) {
        return false;
    }

    let check = |len: usize, factor: u32| -> u32 {
        let total: u32 = digits[..len]
            .iter()
            .enumerate()
            .map(|(i, &d)| d * (factor - i as u32))
            .sum();
        let rem = total % 11;
        if rem < 2 {
            0
        } else {
            11 - rem
        }
    };

    check(9, 10) == digits[9] && check(10, 11) == digits[10]
}

/// Formats an 11-digit CPF for display ("123.456.789-09"); anything else is
/// returned as-is.
pub fn format(cpf: &str) -> String {
    if cpf.len() != 11 {
        return cpf.to_string();
    }
    format!("{}.{}.{}-{}", &cpf[..3], &cpf[3..6], &cpf[6..9], &cpf[9..])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_strips_punctuation() {
        assert_eq!(normalize("529.982.247-25"), "52998224725");
        assert_eq!(normalize(" 529 982 247 25 "), "52998224725");
    }

    #[test]
    fn accepts_known_good_cpfs() {
        assert!(is_valid("52998224725"));
        assert!(is_valid("11144477735"));
    }

    #[test]
    fn rejects_bad_check_digits() {
        assert!(!is_valid("52998224724"));
        assert!(!is_valid("11144477734"));
    }

    #[test]
    fn rejects_repeated_and_short() {
        assert!(!is_valid("00000000000"));
        assert!(!is_valid("11111111111"));
        assert!(!is_valid("1234567890"));
        assert!(!is_valid("123456789012"));
        assert!(!is_valid("5299822472a"));
    }

    #[test]
    fn format_round_trip() {
        assert_eq!(format("52998224725"), "529.982.247-25");
        assert_eq!(format("123"), "123");
    }
}
