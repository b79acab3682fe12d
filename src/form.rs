use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geocode::CoordinateSink;
use crate::model::{Coordinates, Role};
use crate::observable::Observable;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FormError {
    #[error("name must have at least 2 characters")]
    NameTooShort,
    #[error("image url is not a valid URL: {0}")]
    InvalidImageUrl(String),
    #[error("owners must provide a CNPJ")]
    MissingCnpj,
    #[error("CNPJ must have 14 digits")]
    InvalidCnpj,
    #[error("rating must be between 1 and 5")]
    RatingOutOfRange,
    #[error("comment must have at least 10 characters")]
    CommentTooShort,
}

pub const REVIEW_COMMENT_MIN: usize = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RestaurantForm {
    pub name: String,
    pub description: String,
    pub address: String,
    pub cuisine: String,
    pub image_url: String,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}

impl RestaurantForm {
    pub fn coordinates(&self) -> Option<Coordinates> {
        match (self.latitude, self.longitude) {
            (Some(latitude), Some(longitude)) => Some(Coordinates {
                latitude,
                longitude,
            }),
            _ => None,
        }
    }

    pub fn validate(&self) -> Result<(), FormError> {
        if self.name.trim().chars().count() < 2 {
            return Err(FormError::NameTooShort);
        }
        let image = self.image_url.trim();
        if !image.is_empty() && Url::parse(image).is_err() {
            return Err(FormError::InvalidImageUrl(image.to_string()));
        }
        Ok(())
    }
}

/// What a reader types into the review box. `rating` is 0 until a star is
/// picked.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewForm {
    pub rating: u8,
    pub comment: String,
}

impl ReviewForm {
    pub fn validate(&self) -> Result<(), FormError> {
        if !(1..=5).contains(&self.rating) {
            return Err(FormError::RatingOutOfRange);
        }
        if self.comment.chars().count() < REVIEW_COMMENT_MIN {
            return Err(FormError::CommentTooShort);
        }
        Ok(())
    }
}

impl CoordinateSink for Observable<RestaurantForm> {
    fn write_coordinates(&self, coordinates: Coordinates) {
        self.update(|form| {
            form.latitude = Some(coordinates.latitude);
            form.longitude = Some(coordinates.longitude);
        });
    }
}

static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").unwrap());

/// Mask a partially typed CNPJ as `00.000.000/0000-00`, keeping at most 14
/// digits. Non-digits are ignored.
pub fn format_cnpj(input: &str) -> String {
    let digits: String = NON_DIGIT.replace_all(input, "").chars().take(14).collect();
    let mut out = String::with_capacity(18);
    for (i, c) in digits.chars().enumerate() {
        match i {
            2 | 5 => out.push('.'),
            8 => out.push('/'),
            12 => out.push('-'),
            _ => {}
        }
        out.push(c);
    }
    out
}

/// Sign-up rule: choosing the owner role requires a complete CNPJ. Returns
/// the normalized (digits only) CNPJ to store, if any.
pub fn validate_signup_role(role: Role, cnpj: &str) -> Result<Option<String>, FormError> {
    let digits = NON_DIGIT.replace_all(cnpj, "").into_owned();
    match role {
        Role::Owner if digits.is_empty() => Err(FormError::MissingCnpj),
        Role::Owner if digits.len() != 14 => Err(FormError::InvalidCnpj),
        Role::Owner => Ok(Some(digits)),
        _ => Ok(None),
    }
}
