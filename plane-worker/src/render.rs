/// Plain-text rendering of email jobs
///
/// One fixed message per [`EmailJob`] kind; links point at the web app
/// carried in the job.

use crate::mailer::EmailMessage;
use plane_shared::jobs::EmailJob;
use reqwest::Url;

#[derive(Debug, thiserror::Error)]
#[error("invalid web url {url:?}: {reason}")]
pub struct RenderError {
    url: String,
    reason: String,
}

fn link(web_url: &str, path: &str, params: &[(&str, &str)]) -> Result<Url, RenderError> {
    let base = format!("{}{}", web_url.trim_end_matches('/'), path);
    Url::parse_with_params(&base, params).map_err(|e| RenderError {
        url: web_url.to_string(),
        reason: e.to_string(),
    })
}

fn greeting(first_name: &str) -> String {
    let name = first_name.trim();
    if name.is_empty() {
        "Hi,".to_string()
    } else {
        format!("Hi {},", name)
    }
}

/// Renders `job` into a message sent from `from`
pub fn render(job: &EmailJob, from: &str) -> Result<EmailMessage, RenderError> {
    let (subject, body) = match job {
        EmailJob::MagicLink {
            key,
            token,
            web_url,
            ..
        } => {
            let url = link(web_url, "/magic-sign-in/", &[("password", token), ("key", key)])?;
            (
                "Login for Plane".to_string(),
                format!(
                    "Your login code is {}\n\n\
                     Or sign in with this link:\n{}\n\n\
                     The code expires in 10 minutes. If you did not request it, ignore this email.\n",
                    token, url
                ),
            )
        }
        EmailJob::EmailVerification {
            first_name,
            token,
            web_url,
            ..
        } => {
            let url = link(web_url, "/request-email-verification/", &[("token", token)])?;
            (
                "Verify your Email!".to_string(),
                format!(
                    "{}\n\nPlease confirm your email address by opening this link:\n{}\n",
                    greeting(first_name),
                    url
                ),
            )
        }
        EmailJob::ForgotPassword {
            first_name,
            user_id,
            token,
            web_url,
            ..
        } => {
            let uid = user_id.to_string();
            let url = link(
                web_url,
                "/reset-password/",
                &[("uidb64", uid.as_str()), ("token", token)],
            )?;
            (
                "Reset Your Password - Plane".to_string(),
                format!(
                    "{}\n\nSomeone asked to reset the password for your Plane account.\n\
                     Open this link to choose a new one:\n{}\n\n\
                     If this was not you, you can ignore this email.\n",
                    greeting(first_name),
                    url
                ),
            )
        }
    };

    Ok(EmailMessage {
        from: from.to_string(),
        to: job.recipient().to_string(),
        subject,
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const FROM: &str = "Team Plane <team@mailer.plane.so>";

    #[test]
    fn test_magic_link_message() {
        let job = EmailJob::MagicLink {
            email: "jane@example.com".to_string(),
            key: "magic_jane@example.com".to_string(),
            token: "abcd-efgh-ijkl".to_string(),
            web_url: "https://app.plane.so/".to_string(),
        };

        let message = render(&job, FROM).unwrap();

        assert_eq!(message.to, "jane@example.com");
        assert_eq!(message.from, FROM);
        assert_eq!(message.subject, "Login for Plane");
        assert!(message.body.contains("abcd-efgh-ijkl"));
        assert!(message.body.contains(
            "https://app.plane.so/magic-sign-in/?password=abcd-efgh-ijkl&key=magic_jane%40example.com"
        ));
    }

    #[test]
    fn test_verification_message() {
        let job = EmailJob::EmailVerification {
            email: "jane@example.com".to_string(),
            first_name: "Jane".to_string(),
            token: "tok".to_string(),
            web_url: "http://localhost:3000".to_string(),
        };

        let message = render(&job, FROM).unwrap();

        assert_eq!(message.subject, "Verify your Email!");
        assert!(message.body.starts_with("Hi Jane,"));
        assert!(message
            .body
            .contains("http://localhost:3000/request-email-verification/?token=tok"));
    }

    #[test]
    fn test_forgot_password_message() {
        let user_id = Uuid::new_v4();
        let job = EmailJob::ForgotPassword {
            email: "jane@example.com".to_string(),
            first_name: String::new(),
            user_id,
            token: "tok".to_string(),
            web_url: "http://localhost:3000".to_string(),
        };

        let message = render(&job, FROM).unwrap();

        assert!(message.body.starts_with("Hi,"));
        assert!(message.body.contains(&format!("uidb64={}&token=tok", user_id)));
    }

    #[test]
    fn test_invalid_web_url() {
        let job = EmailJob::EmailVerification {
            email: "jane@example.com".to_string(),
            first_name: "Jane".to_string(),
            token: "tok".to_string(),
            web_url: "not a url".to_string(),
        };

        assert!(render(&job, FROM).is_err());
    }
}
