//! Patient-facing message texts.

use frontdesk_core::types::{Patient, Token};

/// Sent once when reception assigns a token.
pub fn token_assigned(patient: &Patient, token: &Token) -> String {
    format!(
        "Hello {}, your token number is {} for {}. Please wait in the reception area, we will message you when the doctor is ready.",
        patient.name,
        token.token_number,
        token.date.format("%d %b %Y"),
    )
}

/// Sent when reception calls the token in.
pub fn doctor_ready(patient: &Patient, token: &Token) -> String {
    format!(
        "Hello {}, the doctor is ready to see you now. Please proceed to the consultation room with token number {}.",
        patient.name, token.token_number,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, Utc};
    use frontdesk_core::types::TokenStatus;

    fn sample() -> (Patient, Token) {
        let patient = Patient {
            id: "p1".into(),
            name: "Meera".into(),
            phone: Some("+919876543210".into()),
        };
        let token = Token {
            id: "t1".into(),
            patient_id: "p1".into(),
            token_number: 17,
            date: NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
            status: TokenStatus::Waiting,
            created_at: Utc::now(),
            version: 1,
        };
        (patient, token)
    }

    #[test]
    fn test_assigned_mentions_number_and_date() {
        let (patient, token) = sample();
        let text = token_assigned(&patient, &token);
        assert!(text.contains("Meera"));
        assert!(text.contains("17"));
        assert!(text.contains("19 Oct 2026"));
    }

    #[test]
    fn test_doctor_ready() {
        let (patient, token) = sample();
        let text = doctor_ready(&patient, &token);
        assert!(text.contains("doctor is ready"));
        assert!(text.contains("17"));
    }
}
