use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use bootnet_infra::accounts::{Credentials, NewRegistration, UserView};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegistrationRequest {
    #[validate(length(min = 1, message = "Firstname is mandatory"))]
    pub first_name: String,

    #[validate(length(min = 1, message = "Lastname is mandatory"))]
    pub last_name: String,

    #[validate(
        length(min = 1, message = "Email is mandatory"),
        email(message = "Email is not well formatted")
    )]
    pub email: String,

    #[validate(
        length(min = 8, max = 128, message = "Password should be 8 to 128 characters long"),
        custom(function = "password_strength")
    )]
    pub password: String,
}

impl RegistrationRequest {
    /// Blank-after-trim names count as missing.
    pub fn normalized(mut self) -> Self {
        self.first_name = self.first_name.trim().to_string();
        self.last_name = self.last_name.trim().to_string();
        self.email = self.email.trim().to_string();
        self
    }
}

impl From<RegistrationRequest> for NewRegistration {
    fn from(req: RegistrationRequest) -> Self {
        NewRegistration {
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            password: req.password,
        }
    }
}

impl std::fmt::Debug for RegistrationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Deserialize, Validate)]
pub struct AuthenticationRequest {
    #[validate(
        length(min = 1, message = "Email is mandatory"),
        email(message = "Email is not well formatted")
    )]
    pub email: String,

    #[validate(length(min = 1, message = "Password is mandatory"))]
    pub password: String,
}

impl From<AuthenticationRequest> for Credentials {
    fn from(req: AuthenticationRequest) -> Self {
        Credentials {
            email: req.email.trim().to_string(),
            password: req.password,
        }
    }
}

impl std::fmt::Debug for AuthenticationRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthenticationRequest")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
pub struct ActivationQuery {
    pub token: String,
}

// -------------------------
// Response DTOs
// -------------------------

#[derive(Debug, Serialize)]
pub struct AuthenticationResponse {
    pub token: String,
}

/// `GET /users/me`: the public view plus current role names.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrentUserResponse {
    #[serde(flatten)]
    pub user: UserView,
    pub roles: Vec<String>,
}

/// At least one upper-case letter, one lower-case letter and one digit.
fn password_strength(password: &str) -> Result<(), ValidationError> {
    let upper = password.chars().any(|c| c.is_ascii_uppercase());
    let lower = password.chars().any(|c| c.is_ascii_lowercase());
    let digit = password.chars().any(|c| c.is_ascii_digit());
    if upper && lower && digit {
        return Ok(());
    }
    let mut err = ValidationError::new("password_strength");
    err.message = Some(
        "Password must contain at least one upper-case letter, one lower-case letter and one digit"
            .into(),
    );
    Err(err)
}
