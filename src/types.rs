use crate::constants::*;
use crate::storage::{Row, Value};
use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

/// One source row, fields kept as free text exactly as read from the file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawRecord {
    #[serde(rename = "Date")]
    pub date: Option<String>,
    #[serde(rename = "Revenue")]
    pub revenue: Option<String>,
    #[serde(rename = "Expenses")]
    pub expenses: Option<String>,
    #[serde(rename = "Tax Income")]
    pub tax_income: Option<String>,
    #[serde(rename = "Debt")]
    pub debt: Option<String>,
    #[serde(rename = "GDP Contribution")]
    pub gdp_contribution: Option<String>,
    #[serde(rename = "Currency")]
    pub currency: Option<String>,
}

impl RawRecord {
    /// Assign a value by its raw header name. Returns false for unknown headers.
    pub fn set_field(&mut self, header: &str, value: Option<String>) -> bool {
        let slot = match header.trim() {
            RAW_DATE => &mut self.date,
            RAW_REVENUE => &mut self.revenue,
            RAW_EXPENSES => &mut self.expenses,
            RAW_TAX_INCOME => &mut self.tax_income,
            RAW_DEBT => &mut self.debt,
            RAW_GDP_CONTRIBUTION => &mut self.gdp_contribution,
            RAW_CURRENCY => &mut self.currency,
            _ => return false,
        };
        *slot = value;
        true
    }

    pub fn field(&self, header: &str) -> Option<&str> {
        match header {
            RAW_DATE => self.date.as_deref(),
            RAW_REVENUE => self.revenue.as_deref(),
            RAW_EXPENSES => self.expenses.as_deref(),
            RAW_TAX_INCOME => self.tax_income.as_deref(),
            RAW_DEBT => self.debt.as_deref(),
            RAW_GDP_CONTRIBUTION => self.gdp_contribution.as_deref(),
            RAW_CURRENCY => self.currency.as_deref(),
            _ => None,
        }
    }
}

/// Calendar quarter label, rendered as `<year>Q<1-4>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Quarter {
    year: i32,
    quarter: u32,
}

impl Quarter {
    pub fn new(year: i32, quarter: u32) -> Option<Self> {
        (1..=4).contains(&quarter).then_some(Self { year, quarter })
    }

    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            quarter: (date.month() - 1) / 3 + 1,
        }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn quarter(&self) -> u32 {
        self.quarter
    }
}

impl fmt::Display for Quarter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Q{}", self.year, self.quarter)
    }
}

impl FromStr for Quarter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (year, q) = s
            .trim()
            .split_once(['Q', 'q'])
            .ok_or_else(|| format!("invalid quarter label '{s}'"))?;
        let year: i32 = year.parse().map_err(|_| format!("invalid year in '{s}'"))?;
        let q: u32 = q.parse().map_err(|_| format!("invalid quarter in '{s}'"))?;
        Quarter::new(year, q).ok_or_else(|| format!("quarter out of range in '{s}'"))
    }
}

impl Serialize for Quarter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Quarter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Normalized row ready for persistence
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalRecord {
    #[serde(rename = "DATE")]
    pub date: Option<NaiveDate>,
    #[serde(rename = "CURRENCY")]
    pub currency: Option<String>,
    #[serde(rename = "REVENUE")]
    pub revenue: Option<f64>,
    #[serde(rename = "EXPENSES")]
    pub expenses: Option<f64>,
    #[serde(rename = "TAX_INCOME")]
    pub tax_income: Option<f64>,
    #[serde(rename = "DEBT")]
    pub debt: Option<f64>,
    #[serde(rename = "GDP_CONTRIBUTION_PERCENTAGE")]
    pub gdp_contribution_percentage: Option<f64>,
    #[serde(rename = "QUARTER")]
    pub quarter: Option<Quarter>,
}

impl CanonicalRecord {
    /// Convert into a store row keyed by the canonical column names.
    pub fn to_row(&self) -> Row {
        let mut row = Row::new();
        row.insert(COL_DATE.to_string(), self.date.into());
        row.insert(COL_CURRENCY.to_string(), self.currency.clone().into());
        row.insert(COL_REVENUE.to_string(), self.revenue.into());
        row.insert(COL_EXPENSES.to_string(), self.expenses.into());
        row.insert(COL_TAX_INCOME.to_string(), self.tax_income.into());
        row.insert(COL_DEBT.to_string(), self.debt.into());
        row.insert(
            COL_GDP_CONTRIBUTION_PERCENTAGE.to_string(),
            self.gdp_contribution_percentage.into(),
        );
        row.insert(
            COL_QUARTER.to_string(),
            self.quarter
                .map(|q| Value::Text(q.to_string()))
                .unwrap_or(Value::Null),
        );
        row
    }
}
