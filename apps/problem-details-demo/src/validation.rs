//! The "invalid parameters" example from RFC 7807, section 3.

use axum::Json;
use axum::extract::Query;
use problem_details::Problem;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const VALIDATION_ERROR: &str = "https://example.net/validation-error";

const COLORS: [&str; 3] = ["blue", "green", "red"];

#[derive(Debug, Default, Deserialize)]
pub struct Params {
    pub age: Option<String>,
    pub color: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InvalidParam {
    pub name: &'static str,
    pub reason: &'static str,
}

/// `GET /invalid-params?age=N&color=C`
///
/// # Errors
/// Returns a 400 problem listing every invalid parameter.
pub async fn check_params(Query(params): Query<Params>) -> Result<Json<Value>, Problem> {
    let (age, color) = validate(&params)?;
    Ok(Json(json!({"age": age, "color": color})))
}

fn validate(params: &Params) -> Result<(u64, &str), Problem> {
    let mut errors = Vec::new();
    let age = extract_age(params.age.as_deref(), &mut errors);
    let color = extract_color(params.color.as_deref(), &mut errors);
    match (age, color) {
        (Some(age), Some(color)) if errors.is_empty() => Ok((age, color)),
        _ => Err(Problem::new(400)
            .with_type(VALIDATION_ERROR)
            .with_title("Your request parameters didn't validate.")
            .with_field("invalid-params", &errors)),
    }
}

fn extract_age(raw: Option<&str>, errors: &mut Vec<InvalidParam>) -> Option<u64> {
    let Some(raw) = raw else {
        errors.push(invalid("age", "is required"));
        return None;
    };
    match raw.trim().parse::<i64>() {
        Ok(age) if age > 0 => u64::try_from(age).ok(),
        Ok(_) => {
            errors.push(invalid("age", "must be a positive integer"));
            None
        }
        Err(_) => {
            errors.push(invalid("age", "must be an integer"));
            None
        }
    }
}

fn extract_color<'a>(raw: Option<&'a str>, errors: &mut Vec<InvalidParam>) -> Option<&'a str> {
    let Some(raw) = raw else {
        errors.push(invalid("color", "is required"));
        return None;
    };
    if COLORS.contains(&raw) {
        Some(raw)
    } else {
        errors.push(invalid("color", "must be 'green', 'red' or 'blue'"));
        None
    }
}

fn invalid(name: &'static str, reason: &'static str) -> InvalidParam {
    InvalidParam { name, reason }
}
