use async_trait::async_trait;
use lettre::message::header::ContentType;
use lettre::message::{Attachment, Body, Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use crate::config::SmtpConfig;
use crate::err::Error;
use crate::models::CandidateStudent;

/// Content-id the HTML body uses to reference the attached QR image.
const QR_CONTENT_ID: &str = "pass-qr";

#[async_trait]
pub trait PassMailer: Send + Sync {
    /// Delivers a pass email with the QR image attached inline, reporting
    /// success or failure before returning.
    async fn send_pass(&self, student: &CandidateStudent, qr_png: &[u8]) -> Result<(), Error>;
}

pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(config: &SmtpConfig) -> anyhow::Result<Self> {
        let transport = AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)?
            .credentials(Credentials::new(
                config.username.clone(),
                config.password.clone(),
            ))
            .build();
        let from = config.from.parse()?;
        Ok(Self { transport, from })
    }

    fn build_message(&self, student: &CandidateStudent, qr_png: &[u8]) -> Result<Message, Error> {
        let to: Mailbox = student.email.parse().map_err(|_| Error::InvalidPayload {
            message: format!("Invalid recipient address: {}", student.email),
        })?;
        let png_type = ContentType::parse("image/png").map_err(|e| Error::InternalError {
            kind: "MailError",
            message: e.to_string(),
        })?;
        let qr_part =
            Attachment::new_inline(QR_CONTENT_ID.to_string()).body(Body::new(qr_png.to_vec()), png_type);
        Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Your Event Pass")
            .multipart(
                MultiPart::related()
                    .singlepart(
                        SinglePart::builder()
                            .header(ContentType::TEXT_HTML)
                            .body(render_pass_html(student)),
                    )
                    .singlepart(qr_part),
            )
            .map_err(|e| Error::InternalError {
                kind: "MailError",
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl PassMailer for SmtpMailer {
    async fn send_pass(&self, student: &CandidateStudent, qr_png: &[u8]) -> Result<(), Error> {
        let message = self.build_message(student, qr_png)?;
        self.transport.send(message).await.map_err(|e| {
            log::error!("Failed to send pass email to {}: {}", student.email, e);
            Error::MailDelivery {
                message: format!("Could not deliver pass email to {}", student.email),
            }
        })?;
        Ok(())
    }
}

fn render_pass_html(student: &CandidateStudent) -> String {
    let roll_line = format!("<p><strong>Roll number:</strong> {}</p>", student.roll_number);
    let class_line = match &student.class_section {
        Some(section) => format!("<p><strong>Class:</strong> {}</p>", section),
        None => String::new(),
    };
    format!(
        "<div style=\"font-family: Arial, sans-serif; max-width: 600px; margin: 0 auto;\">\
         <h2 style=\"color: #333;\">Your Event Pass</h2>\
         <p>Dear {name},</p>\
         <p>Your event pass has been generated. Please find your QR code below:</p>\
         <div style=\"text-align: center; margin: 20px 0;\">\
         <img src=\"cid:{cid}\" alt=\"QR Code\" style=\"max-width: 200px;\"/>\
         </div>\
         {roll_line}\
         {class_line}\
         <p>Please keep this QR code safe and show it at the event entrance.</p>\
         <p>Best regards,<br>Event Pass Desk</p>\
         </div>",
        name = student.name,
        cid = QR_CONTENT_ID,
        roll_line = roll_line,
        class_line = class_line,
    )
}
