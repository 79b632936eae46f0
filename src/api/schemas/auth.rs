use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Signup {
    #[serde(default)]
    pub full_name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct Login {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoogleLogin {
    #[serde(default, alias = "credential")]
    pub id_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileUpdate {
    pub full_name: Option<String>,
    pub profile_pic: Option<String>,
    pub bio: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ForgotPassword {
    #[serde(default)]
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPassword {
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailParams {
    #[serde(default)]
    pub token: String,
}
