use base64ct::{Base64UrlUnpadded, Encoding};
use lettre::{
    message::header::ContentType, transport::smtp::authentication::Credentials,
    AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor,
};
use tracing::info;

use crate::{auth::token::TOKEN_LENGTH, config::SmtpConfig, users::repo::User};

/// Builds the externally shared reset token: the plaintext secret followed by
/// a base64url copy of the handle, so the consuming endpoint can recover the
/// handle without a lookup table.
pub fn build_reset_token(secret: &str, handle: &str) -> String {
    format!("{secret}{}", Base64UrlUnpadded::encode_string(handle.as_bytes()))
}

/// Splits a presented reset token back into (secret, handle). Returns `None`
/// for anything too short or with an undecodable handle suffix.
pub fn split_reset_token(token: &str) -> Option<(String, String)> {
    if token.len() <= TOKEN_LENGTH || !token.is_char_boundary(TOKEN_LENGTH) {
        return None;
    }
    let (secret, encoded) = token.split_at(TOKEN_LENGTH);
    let handle = Base64UrlUnpadded::decode_vec(encoded).ok()?;
    let handle = String::from_utf8(handle).ok()?;
    Some((secret.to_string(), handle))
}

/// Sends the password-recovery mail carrying the reset token. Users without
/// an email address are silently skipped.
pub async fn send_recovery_email(
    smtp: &SmtpConfig,
    frontend_url: &str,
    user: &User,
    reset_token: &str,
) -> anyhow::Result<()> {
    let Some(email) = user.email.as_deref() else {
        return Ok(());
    };

    let url = format!("{frontend_url}/password-reset?token={reset_token}");
    let message = Message::builder()
        .from(format!("Cleaning List Password Recovery <{}>", smtp.from).parse()?)
        .to(email.parse()?)
        .subject("Password recovery")
        .header(ContentType::TEXT_PLAIN)
        .body(format!(
            "A request to reset your password has been sent. If this wasn't you, \
             you don't have to do anything. If this happens multiple times you \
             should consider changing your password as it's possible someone is \
             trying to gain access to your account.\n\n\
             If you were the one who asked to change password you can find the \
             token here:\n\n{reset_token}\n\nOr follow this link: {url}\n"
        ))?;

    let mailer = AsyncSmtpTransport::<Tokio1Executor>::relay(&smtp.server)?
        .credentials(Credentials::new(smtp.username.clone(), smtp.password.clone()))
        .build();
    mailer.send(message).await?;
    info!(handle = %user.handle, "password recovery email sent");
    Ok(())
}
