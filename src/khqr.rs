use crc::{Crc, CRC_16_IBM_3740};
use serde::Serialize;
use std::collections::HashMap;

/// CRC-16/CCITT-FALSE, как требует EMVCo
const CRC16: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_3740);

const TAG_PAYLOAD_FORMAT: &str = "00";
const TAG_POINT_OF_INITIATION: &str = "01";
const TAG_INDIVIDUAL_ACCOUNT: &str = "29";
const TAG_MERCHANT_ACCOUNT: &str = "30";
const TAG_MERCHANT_CATEGORY: &str = "52";
const TAG_CURRENCY: &str = "53";
const TAG_COUNTRY: &str = "58";
const TAG_MERCHANT_NAME: &str = "59";
const TAG_MERCHANT_CITY: &str = "60";
const TAG_CRC: &str = "63";

const CURRENCY_KHR: &str = "116";
const CURRENCY_USD: &str = "840";

const MAX_MERCHANT_NAME: usize = 25;
const MAX_MERCHANT_CITY: usize = 15;
const MAX_ACCOUNT_ID: usize = 32;

#[derive(Debug, Clone, Default)]
pub struct KhqrValidator;

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct KhqrVerification {
    pub is_valid: bool,
    pub details: String,
}

impl KhqrVerification {
    fn valid() -> Self {
        Self {
            is_valid: true,
            details: "Valid KHQR".to_string(),
        }
    }

    fn invalid(details: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            details: details.into(),
        }
    }
}

impl KhqrValidator {
    pub fn new() -> Self {
        Self
    }

    /// Проверить строку из QR кода на соответствие KHQR
    pub fn verify(&self, payload: &str) -> KhqrVerification {
        match self.check(payload) {
            Ok(()) => KhqrVerification::valid(),
            Err(reason) => {
                log::debug!("KHQR verification failed: {}", reason);
                KhqrVerification::invalid(reason)
            }
        }
    }

    /// CRC для всего, что стоит перед значением тега 63 (включая "6304")
    pub fn checksum(&self, payload: &str) -> String {
        format!("{:04X}", CRC16.checksum(payload.as_bytes()))
    }

    fn check(&self, payload: &str) -> Result<(), String> {
        let crc_prefix = format!("{}04", TAG_CRC);

        // В конце "6304" + 4 hex цифры
        let split = payload
            .len()
            .checked_sub(4)
            .filter(|&i| payload.is_char_boundary(i))
            .ok_or_else(|| "payload too short".to_string())?;
        let (signed, crc_value) = payload.split_at(split);
        if !signed.ends_with(&crc_prefix) {
            return Err("CRC tag missing".to_string());
        }
        let expected = self.checksum(signed);
        if !crc_value.eq_ignore_ascii_case(&expected) {
            return Err(format!("CRC mismatch: got {}, expected {}", crc_value, expected));
        }

        let fields = parse_tlv(payload)?;
        if fields.first().map(|(tag, _)| tag.as_str()) != Some(TAG_PAYLOAD_FORMAT) {
            return Err("payload format indicator must come first".to_string());
        }

        let mut tags: HashMap<&str, &str> = HashMap::new();
        for (tag, value) in &fields {
            if tags.insert(tag.as_str(), value.as_str()).is_some() {
                return Err(format!("duplicate tag {}", tag));
            }
        }

        expect_value(&tags, TAG_PAYLOAD_FORMAT, &["01"])?;
        if tags.contains_key(TAG_POINT_OF_INITIATION) {
            expect_value(&tags, TAG_POINT_OF_INITIATION, &["11", "12"])?;
        }

        let account = match (tags.get(TAG_INDIVIDUAL_ACCOUNT), tags.get(TAG_MERCHANT_ACCOUNT)) {
            (Some(account), None) | (None, Some(account)) => *account,
            (Some(_), Some(_)) => return Err("both individual and merchant account present".to_string()),
            (None, None) => return Err("merchant account information missing".to_string()),
        };
        check_account(account)?;

        required(&tags, TAG_MERCHANT_CATEGORY)?;
        expect_value(&tags, TAG_CURRENCY, &[CURRENCY_KHR, CURRENCY_USD])?;
        expect_value(&tags, TAG_COUNTRY, &["KH"])?;
        check_length(required(&tags, TAG_MERCHANT_NAME)?, TAG_MERCHANT_NAME, MAX_MERCHANT_NAME)?;
        check_length(required(&tags, TAG_MERCHANT_CITY)?, TAG_MERCHANT_CITY, MAX_MERCHANT_CITY)?;

        if fields.last().map(|(tag, _)| tag.as_str()) != Some(TAG_CRC) {
            return Err("CRC must be the last field".to_string());
        }

        Ok(())
    }
}

/// Разобрать EMV tag-length-value: 2 цифры тега, 2 цифры длины, значение
fn parse_tlv(input: &str) -> Result<Vec<(String, String)>, String> {
    let chars: Vec<char> = input.chars().collect();
    let mut fields = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        if pos + 4 > chars.len() {
            return Err(format!("truncated field header at {}", pos));
        }
        let tag: String = chars[pos..pos + 2].iter().collect();
        let len_str: String = chars[pos + 2..pos + 4].iter().collect();
        if !tag.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("invalid tag '{}'", tag));
        }
        let len: usize = len_str
            .parse()
            .map_err(|_| format!("invalid length '{}' for tag {}", len_str, tag))?;

        let start = pos + 4;
        let end = start + len;
        if end > chars.len() {
            return Err(format!("tag {} overruns payload", tag));
        }

        fields.push((tag, chars[start..end].iter().collect()));
        pos = end;
    }

    Ok(fields)
}

fn required<'a>(tags: &HashMap<&str, &'a str>, tag: &str) -> Result<&'a str, String> {
    match tags.get(tag) {
        Some(value) if !value.is_empty() => Ok(*value),
        _ => Err(format!("required tag {} missing", tag)),
    }
}

fn expect_value(tags: &HashMap<&str, &str>, tag: &str, allowed: &[&str]) -> Result<(), String> {
    let value = required(tags, tag)?;
    if allowed.contains(&value) {
        Ok(())
    } else {
        Err(format!("tag {} has unexpected value '{}'", tag, value))
    }
}

fn check_length(value: &str, tag: &str, max: usize) -> Result<(), String> {
    if value.chars().count() > max {
        return Err(format!("tag {} longer than {} characters", tag, max));
    }
    Ok(())
}

fn check_account(template: &str) -> Result<(), String> {
    let sub_fields = parse_tlv(template)?;
    let account_id = sub_fields
        .iter()
        .find(|(tag, _)| tag == "00")
        .map(|(_, value)| value.as_str())
        .ok_or_else(|| "Bakong account id missing".to_string())?;

    if account_id.is_empty() || !account_id.contains('@') {
        return Err(format!("invalid Bakong account id '{}'", account_id));
    }
    check_length(account_id, "29/00", MAX_ACCOUNT_ID)
}

/// Собрать KHQR строку с корректным CRC (для тестов)
#[cfg(test)]
pub(crate) fn build_payload(fields: &[(&str, &str)]) -> String {
    let mut payload: String = fields
        .iter()
        .map(|(tag, value)| format!("{}{:02}{}", tag, value.chars().count(), value))
        .collect();
    payload.push_str("6304");
    let crc = KhqrValidator::new().checksum(&payload);
    payload.push_str(&crc);
    payload
}

#[cfg(test)]
pub(crate) fn sample_individual_payload() -> String {
    build_payload(&[
        ("00", "01"),
        ("01", "11"),
        ("29", "0013john_doe@aclb"),
        ("52", "5999"),
        ("58", "KH"),
        ("59", "John Doe"),
        ("60", "Phnom Penh"),
        ("53", "116"),
        ("99", "00131700000000000"),
    ])
}
