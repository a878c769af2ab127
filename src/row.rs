use thiserror::Error;

use crate::constants::*;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RowError {
    #[error("ID must be positive.")]
    NonPositiveId { id: i32 },
    #[error("String is too long.")]
    StringTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },
    #[error("String contains a NUL byte.")]
    NulByte { field: &'static str },
    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

/// A record of the single table: `(id, username, email)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: i32,
    pub username: String,
    pub email: String,
}

impl Row {
    pub fn new(id: i32, username: impl Into<String>, email: impl Into<String>) -> Self {
        Row {
            id,
            username: username.into(),
            email: email.into(),
        }
    }

    /// Checks the id, and the text against the fixed column widths.
    pub fn validate(&self) -> Result<(), RowError> {
        if self.id <= 0 {
            return Err(RowError::NonPositiveId { id: self.id });
        }
        check_text("username", &self.username, USERNAME_MAX_LENGTH)?;
        check_text("email", &self.email, EMAIL_MAX_LENGTH)?;
        Ok(())
    }

    /// The B-tree key of this row. Only meaningful for validated rows.
    pub fn key(&self) -> u32 {
        self.id as u32
    }

    pub fn encode(&self) -> Result<[u8; ROW_SIZE], RowError> {
        self.validate()?;

        let mut buf = [0u8; ROW_SIZE];
        buf[ID_OFFSET..USERNAME_OFFSET].copy_from_slice(&self.key().to_le_bytes());

        let username = self.username.as_bytes();
        buf[USERNAME_OFFSET..USERNAME_OFFSET + username.len()].copy_from_slice(username);

        let email = self.email.as_bytes();
        buf[EMAIL_OFFSET..EMAIL_OFFSET + email.len()].copy_from_slice(email);

        Ok(buf)
    }

    pub fn decode(buf: &[u8; ROW_SIZE]) -> Result<Row, RowError> {
        let mut id = [0u8; ID_SIZE];
        id.copy_from_slice(&buf[ID_OFFSET..USERNAME_OFFSET]);

        Ok(Row {
            id: u32::from_le_bytes(id) as i32,
            username: read_text("username", &buf[USERNAME_OFFSET..EMAIL_OFFSET])?,
            email: read_text("email", &buf[EMAIL_OFFSET..ROW_SIZE])?,
        })
    }
}

// A zero byte would end the column early on decode.
fn check_text(field: &'static str, value: &str, max: usize) -> Result<(), RowError> {
    if value.contains('\0') {
        return Err(RowError::NulByte { field });
    }
    if value.len() > max {
        return Err(RowError::StringTooLong {
            field,
            len: value.len(),
            max,
        });
    }
    Ok(())
}

// Text columns end at the first zero byte.
fn read_text(field: &'static str, column: &[u8]) -> Result<String, RowError> {
    let end = column.iter().position(|b| *b == 0).unwrap_or(column.len());
    String::from_utf8(column[..end].to_vec()).map_err(|_| RowError::InvalidUtf8 { field })
}
