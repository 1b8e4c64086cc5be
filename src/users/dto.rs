use serde::Deserialize;

/// Body of `PUT /users/{id}`. A `password` field may be sent but is ignored;
/// passwords are only set at registration.
#[derive(Debug, Deserialize)]
pub struct UpdateUserRequest {
    pub name: String,
    pub email: String,
    pub role: String,
}
