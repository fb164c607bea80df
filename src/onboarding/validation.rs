//! Form-level input checks run before an action is attempted.
//!
//! These never touch session state; a failure is returned to the caller as
//! a `ValidationError` naming the offending field.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use reqwest::Url;
use secrecy::{ExposeSecret, SecretString};

use crate::api::FileUpload;
use crate::error::ValidationError;

use super::model::ContactInfo;

pub const MAX_FILES: usize = 10;
pub const MAX_FILE_BYTES: usize = 25 * 1024 * 1024;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles")
});

/// Accepted upload types by extension.
const ALLOWED_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    ("doc", "application/msword"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    ("txt", "text/plain"),
];

/// Trim and lowercase an email address, then check its shape.
pub fn normalize_email(input: &str) -> Result<String, ValidationError> {
    let email = input.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::new("email", "Email is required"));
    }
    if !EMAIL_RE.is_match(&email) {
        return Err(ValidationError::new(
            "email",
            "Please enter a valid email address",
        ));
    }
    Ok(email)
}

/// The verification code is exactly six digits.
pub fn validate_otp(input: &str) -> Result<String, ValidationError> {
    let code = input.trim();
    if code.chars().count() != 6 {
        return Err(ValidationError::new("otp", "OTP must be 6 digits"));
    }
    if !code.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("otp", "OTP must contain only numbers"));
    }
    Ok(code.to_string())
}

pub fn validate_password(
    password: &SecretString,
    confirm: &SecretString,
) -> Result<(), ValidationError> {
    let value = password.expose_secret();
    let len = value.chars().count();
    if len < 8 {
        return Err(ValidationError::new(
            "password",
            "Password must be at least 8 characters",
        ));
    }
    if len > 128 {
        return Err(ValidationError::new(
            "password",
            "Password must be less than 128 characters",
        ));
    }

    let has_lower = value.chars().any(|c| c.is_ascii_lowercase());
    let has_upper = value.chars().any(|c| c.is_ascii_uppercase());
    let has_digit = value.chars().any(|c| c.is_ascii_digit());
    if !(has_lower && has_upper && has_digit) {
        return Err(ValidationError::new(
            "password",
            "Password must contain at least one uppercase letter, one lowercase letter, and one number",
        ));
    }

    if value != confirm.expose_secret() {
        return Err(ValidationError::new("confirm_password", "Passwords don't match"));
    }
    Ok(())
}

/// Normalize a website to `https://host[/path]`.
///
/// Any scheme the user typed is dropped; the host must contain a dot.
pub fn normalize_domain(input: &str) -> Result<String, ValidationError> {
    let cleaned = input.trim().to_lowercase();
    if cleaned.is_empty() {
        return Err(ValidationError::new("domain", "Website domain is required"));
    }
    let bare = cleaned
        .strip_prefix("https://")
        .or_else(|| cleaned.strip_prefix("http://"))
        .unwrap_or(&cleaned);
    let bare = bare.strip_suffix('/').unwrap_or(bare);
    let domain = format!("https://{bare}");

    let valid = Url::parse(&domain)
        .ok()
        .and_then(|url| url.host_str().map(str::to_string))
        .is_some_and(|host| host.contains('.') && host.len() > 3);
    if !valid {
        return Err(ValidationError::new(
            "domain",
            "Please enter a valid website domain (e.g., example.com or www.example.com)",
        ));
    }
    Ok(domain)
}

/// Support email is required; the rest is optional. Blank optionals
/// collapse to `None`.
pub fn validate_contact_info(contact: ContactInfo) -> Result<ContactInfo, ValidationError> {
    let support_email = contact.support_email.trim().to_lowercase();
    if support_email.is_empty() {
        return Err(ValidationError::new(
            "support_email",
            "Support email is required",
        ));
    }
    if !EMAIL_RE.is_match(&support_email) {
        return Err(ValidationError::new(
            "support_email",
            "Please enter a valid email address",
        ));
    }

    let tidy = |value: Option<String>| {
        value
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    };
    Ok(ContactInfo {
        support_email,
        company_name: tidy(contact.company_name),
        support_phone: tidy(contact.support_phone),
        address: tidy(contact.address),
        support_person_name: tidy(contact.support_person_name),
    })
}

/// MIME type for an accepted upload, by file extension.
pub fn mime_type_for(file_name: &str) -> Option<&'static str> {
    let ext = Path::new(file_name)
        .extension()?
        .to_str()?
        .to_ascii_lowercase();
    ALLOWED_TYPES
        .iter()
        .find(|(allowed, _)| *allowed == ext)
        .map(|(_, mime)| *mime)
}

pub fn validate_files(files: &[FileUpload]) -> Result<(), ValidationError> {
    if files.len() > MAX_FILES {
        return Err(ValidationError::new(
            "files",
            format!("You can upload at most {MAX_FILES} files"),
        ));
    }
    for file in files {
        if file.bytes.len() > MAX_FILE_BYTES {
            return Err(ValidationError::new(
                "files",
                format!(
                    "File {} is too large. Maximum size is {}MB",
                    file.name,
                    MAX_FILE_BYTES / 1024 / 1024
                ),
            ));
        }
        if mime_type_for(&file.name).is_none() {
            return Err(ValidationError::new(
                "files",
                format!("File {} is not a PDF, DOC, DOCX, or TXT file", file.name),
            ));
        }
    }
    Ok(())
}

/// Normalize the page the widget should be found on.
pub fn normalize_page_url(input: &str) -> Result<String, ValidationError> {
    let cleaned = input.trim().to_lowercase();
    if cleaned.is_empty() {
        return Err(ValidationError::new("page_url", "Please enter a valid URL"));
    }
    let candidate = if cleaned.starts_with("http://") || cleaned.starts_with("https://") {
        cleaned
    } else {
        format!("https://{cleaned}")
    };
    match Url::parse(&candidate) {
        Ok(url) if url.host_str().is_some() => Ok(candidate),
        _ => Err(ValidationError::new("page_url", "Please enter a valid URL")),
    }
}
