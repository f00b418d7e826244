use std::{fmt, str::FromStr, sync::LazyLock};

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregate::AggregateRoot;
use crate::error::{DomainError, Result};
use crate::events::{CustomerCreatedDomainEvent, CustomerDomainEvent};

const MAX_NAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 254;
const MIN_PHONE_DIGITS: usize = 8;
const MAX_PHONE_DIGITS: usize = 15;
const MIN_BANK_ACCOUNT_LEN: usize = 8;
const MAX_BANK_ACCOUNT_LEN: usize = 34;
const MIN_BIRTH_YEAR: i32 = 1900;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@.]{2,}$").expect("email pattern is valid")
});

/// Identifier of a customer aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CustomerId(Uuid);

impl CustomerId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for CustomerId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for CustomerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for CustomerId {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self> {
        Uuid::parse_str(value.trim())
            .map(Self)
            .map_err(|_| DomainError::validation("id", "must be a UUID"))
    }
}

/// First or last name of a customer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersonName(String);

impl PersonName {
    pub fn new(field: &'static str, raw: &str) -> Result<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(DomainError::validation(field, "is required"));
        }
        if value.chars().count() > MAX_NAME_LEN {
            return Err(DomainError::validation(
                field,
                format!("must be at most {MAX_NAME_LEN} characters"),
            ));
        }
        if value.chars().any(char::is_control) {
            return Err(DomainError::validation(field, "contains control characters"));
        }
        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Calendar date of birth, never in the future.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateOfBirth(NaiveDate);

impl DateOfBirth {
    /// Parses an ISO date (`YYYY-MM-DD`) or the date part of an ISO date-time.
    pub fn parse(raw: &str, today: NaiveDate) -> Result<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(DomainError::validation("date_of_birth", "is required"));
        }

        let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .ok()
            .or_else(|| {
                DateTime::parse_from_rfc3339(value)
                    .ok()
                    .map(|dt| dt.date_naive())
            })
            .or_else(|| {
                NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
                    .ok()
                    .map(|dt| dt.date())
            })
            .ok_or_else(|| {
                DomainError::validation("date_of_birth", "must be an ISO date (YYYY-MM-DD)")
            })?;

        Self::new(date, today)
    }

    pub fn new(date: NaiveDate, today: NaiveDate) -> Result<Self> {
        if date > today {
            return Err(DomainError::validation(
                "date_of_birth",
                "cannot be in the future",
            ));
        }
        if date.year() < MIN_BIRTH_YEAR {
            return Err(DomainError::validation(
                "date_of_birth",
                format!("must not be before {MIN_BIRTH_YEAR}"),
            ));
        }
        Ok(Self(date))
    }

    pub fn as_date(&self) -> NaiveDate {
        self.0
    }
}

/// Phone number with an optional country prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhoneNumber(String);

impl PhoneNumber {
    pub fn new(raw: &str) -> Result<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(DomainError::validation("phone_number", "is required"));
        }

        let body = value.strip_prefix('+').unwrap_or(value);
        let mut digits = 0usize;
        for ch in body.chars() {
            match ch {
                '0'..='9' => digits += 1,
                ' ' | '-' | '(' | ')' | '.' => {}
                other => {
                    return Err(DomainError::validation(
                        "phone_number",
                        format!("contains invalid character '{other}'"),
                    ))
                }
            }
        }

        if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits) {
            return Err(DomainError::validation(
                "phone_number",
                format!("must have {MIN_PHONE_DIGITS} to {MAX_PHONE_DIGITS} digits"),
            ));
        }

        Ok(Self(value.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Lower-cased email address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email(String);

impl Email {
    pub fn new(raw: &str) -> Result<Self> {
        let value = raw.trim().to_lowercase();
        if value.is_empty() {
            return Err(DomainError::validation("email", "is required"));
        }
        if value.len() > MAX_EMAIL_LEN || !EMAIL_PATTERN.is_match(&value) {
            return Err(DomainError::validation("email", "invalid format"));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Bank account number stored without spaces in upper case.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BankAccountNumber(String);

impl BankAccountNumber {
    pub fn new(raw: &str) -> Result<Self> {
        let value: String = raw
            .chars()
            .filter(|ch| !ch.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();
        if value.is_empty() {
            return Err(DomainError::validation("bank_account_number", "is required"));
        }
        if !value.chars().all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(DomainError::validation(
                "bank_account_number",
                "must only contain letters and digits",
            ));
        }
        if !(MIN_BANK_ACCOUNT_LEN..=MAX_BANK_ACCOUNT_LEN).contains(&value.len()) {
            return Err(DomainError::validation(
                "bank_account_number",
                format!("must be {MIN_BANK_ACCOUNT_LEN} to {MAX_BANK_ACCOUNT_LEN} characters"),
            ));
        }
        Ok(Self(value))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Customer aggregate root.
///
/// Created through [`Customer::create`], mutated only through the `change_*`
/// operations and removed after [`Customer::delete`]. Every mutation validates
/// its input before touching state and records a [`CustomerDomainEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    id: CustomerId,
    firstname: PersonName,
    lastname: PersonName,
    date_of_birth: DateOfBirth,
    phone_number: PhoneNumber,
    email: Email,
    bank_account_number: BankAccountNumber,
    deleted: bool,
    events: Vec<CustomerDomainEvent>,
}

impl Customer {
    /// Validates every field and builds a new customer with a fresh identifier.
    pub fn create(
        firstname: &str,
        lastname: &str,
        date_of_birth: &str,
        phone_number: &str,
        email: &str,
        bank_account_number: &str,
        now: DateTime<Utc>,
    ) -> Result<Self> {
        let firstname = PersonName::new("firstname", firstname)?;
        let lastname = PersonName::new("lastname", lastname)?;
        let date_of_birth = DateOfBirth::parse(date_of_birth, now.date_naive())?;
        let phone_number = PhoneNumber::new(phone_number)?;
        let email = Email::new(email)?;
        let bank_account_number = BankAccountNumber::new(bank_account_number)?;

        let id = CustomerId::new();
        let created = CustomerCreatedDomainEvent {
            customer_id: id,
            firstname: firstname.as_str().to_string(),
            lastname: lastname.as_str().to_string(),
            date_of_birth: date_of_birth.as_date(),
            phone_number: phone_number.as_str().to_string(),
            email: email.as_str().to_string(),
            bank_account_number: bank_account_number.as_str().to_string(),
            occurred_at: now,
        };

        Ok(Self {
            id,
            firstname,
            lastname,
            date_of_birth,
            phone_number,
            email,
            bank_account_number,
            deleted: false,
            events: vec![CustomerDomainEvent::Created(created)],
        })
    }

    /// Rebuilds a customer from persisted state without recording events.
    pub fn rehydrate(
        id: CustomerId,
        firstname: String,
        lastname: String,
        date_of_birth: NaiveDate,
        phone_number: String,
        email: String,
        bank_account_number: String,
    ) -> Self {
        Self {
            id,
            firstname: PersonName(firstname),
            lastname: PersonName(lastname),
            date_of_birth: DateOfBirth(date_of_birth),
            phone_number: PhoneNumber(phone_number),
            email: Email(email),
            bank_account_number: BankAccountNumber(bank_account_number),
            deleted: false,
            events: Vec::new(),
        }
    }

    /// Replaces the phone number. Returns `false` when the value is unchanged.
    pub fn change_phone_number(&mut self, raw: &str, now: DateTime<Utc>) -> Result<bool> {
        self.ensure_active()?;
        let phone_number = PhoneNumber::new(raw)?;
        if phone_number == self.phone_number {
            return Ok(false);
        }

        self.events.push(CustomerDomainEvent::PhoneNumberChanged {
            customer_id: self.id,
            phone_number: phone_number.as_str().to_string(),
            occurred_at: now,
        });
        self.phone_number = phone_number;
        Ok(true)
    }

    /// Replaces the email address. Returns `false` when the value is unchanged.
    pub fn change_email(&mut self, raw: &str, now: DateTime<Utc>) -> Result<bool> {
        self.ensure_active()?;
        let email = Email::new(raw)?;
        if email == self.email {
            return Ok(false);
        }

        self.events.push(CustomerDomainEvent::EmailChanged {
            customer_id: self.id,
            email: email.as_str().to_string(),
            occurred_at: now,
        });
        self.email = email;
        Ok(true)
    }

    /// Applies an optional phone number and email change as one step.
    ///
    /// Both values are validated before either is applied, so a rejected email
    /// never leaves a changed phone number behind.
    pub fn update_contact(
        &mut self,
        phone_number: Option<&str>,
        email: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.ensure_active()?;
        if phone_number.is_none() && email.is_none() {
            return Err(DomainError::validation(
                "body",
                "at least one of phone_number or email is required",
            ));
        }
        if let Some(raw) = phone_number {
            PhoneNumber::new(raw)?;
        }
        if let Some(raw) = email {
            Email::new(raw)?;
        }

        let mut changed = false;
        if let Some(raw) = phone_number {
            changed |= self.change_phone_number(raw, now)?;
        }
        if let Some(raw) = email {
            changed |= self.change_email(raw, now)?;
        }
        Ok(changed)
    }

    /// Marks the customer as deleted; the repository removes the row on commit.
    pub fn delete(&mut self, now: DateTime<Utc>) -> Result<()> {
        self.ensure_active()?;
        self.deleted = true;
        self.events.push(CustomerDomainEvent::Deleted {
            customer_id: self.id,
            occurred_at: now,
        });
        Ok(())
    }

    fn ensure_active(&self) -> Result<()> {
        if self.is_deleted() {
            return Err(DomainError::NotFound {
                entity: "customer",
                id: self.id.to_string(),
            });
        }
        Ok(())
    }

    pub fn firstname(&self) -> &str {
        self.firstname.as_str()
    }

    pub fn lastname(&self) -> &str {
        self.lastname.as_str()
    }

    pub fn date_of_birth(&self) -> NaiveDate {
        self.date_of_birth.as_date()
    }

    pub fn phone_number(&self) -> &str {
        self.phone_number.as_str()
    }

    pub fn email(&self) -> &str {
        self.email.as_str()
    }

    pub fn bank_account_number(&self) -> &str {
        self.bank_account_number.as_str()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }
}

impl AggregateRoot for Customer {
    type Id = CustomerId;
    type Event = CustomerDomainEvent;

    const AGGREGATE_TYPE: &'static str = "customer";

    fn id(&self) -> &CustomerId {
        &self.id
    }

    fn pending_events(&self) -> &[CustomerDomainEvent] {
        &self.events
    }

    fn take_events(&mut self) -> Vec<CustomerDomainEvent> {
        std::mem::take(&mut self.events)
    }
}
