//! Example demonstrating changeset-style validation without derive sugar:
//! a plain function that builds a `ValidationErrors` from the `validate`
//! feature's helpers.
//!
//! Run with:
//!   cargo run --example changeset -p rowcraft --features validate

use rowcraft::changeset::{ValidationCode, ValidationError, ValidationErrors};
use rowcraft::validate;

struct NewUserInput {
    name: String,
    email: String,
    age: i32,
    website: Option<String>,
}

fn validate_new_user(input: &NewUserInput) -> ValidationErrors {
    let mut errors = ValidationErrors::default();

    if input.name.trim().is_empty() {
        errors.push(ValidationError::new("name", ValidationCode::Required, "name is required"));
    } else if !(2..=100).contains(&input.name.len()) {
        errors.push(ValidationError::new(
            "name",
            ValidationCode::Len,
            "name must be between 2 and 100 characters",
        ));
    }

    if !validate::is_email(&input.email) {
        errors.push(ValidationError::new("email", ValidationCode::Email, "must be a valid email address"));
    }

    if !(0..=150).contains(&input.age) {
        errors.push(
            ValidationError::new("age", ValidationCode::Range, "must be between 0 and 150")
                .with_metadata("min", 0)
                .with_metadata("max", 150),
        );
    }

    if let Some(website) = &input.website {
        if !validate::is_url(website) {
            errors.push(ValidationError::new("website", ValidationCode::Url, "must be a valid URL"));
        }
    }

    errors
}

fn main() {
    let valid = NewUserInput {
        name: "Ada Lovelace".to_string(),
        email: "ada@example.com".to_string(),
        age: 36,
        website: Some("https://example.com".to_string()),
    };
    let errors = validate_new_user(&valid);
    println!("[valid input] errors: {}", errors.len());

    let invalid = NewUserInput {
        name: "a".to_string(),
        email: "not-an-email".to_string(),
        age: 200,
        website: Some("not a url".to_string()),
    };
    let errors = validate_new_user(&invalid);
    println!("[invalid input] errors: {}", errors.len());
    for err in errors.iter() {
        println!("  {}: {} ({})", err.field, err.message, err.code.as_str());
    }
}
