/// Field and column name constants shared by the extract, normalize and load stages.

// Raw field names as they appear in the source file headers
pub const RAW_DATE: &str = "Date";
pub const RAW_REVENUE: &str = "Revenue";
pub const RAW_EXPENSES: &str = "Expenses";
pub const RAW_TAX_INCOME: &str = "Tax Income";
pub const RAW_DEBT: &str = "Debt";
pub const RAW_GDP_CONTRIBUTION: &str = "GDP Contribution";
pub const RAW_CURRENCY: &str = "Currency";

/// Expected header row of a source file, in order.
pub const RAW_FIELDS: [&str; 7] = [
    RAW_DATE,
    RAW_REVENUE,
    RAW_EXPENSES,
    RAW_TAX_INCOME,
    RAW_DEBT,
    RAW_GDP_CONTRIBUTION,
    RAW_CURRENCY,
];

// Canonical column names (persisted table layout)
pub const COL_DATE: &str = "DATE";
pub const COL_CURRENCY: &str = "CURRENCY";
pub const COL_REVENUE: &str = "REVENUE";
pub const COL_EXPENSES: &str = "EXPENSES";
pub const COL_TAX_INCOME: &str = "TAX_INCOME";
pub const COL_DEBT: &str = "DEBT";
pub const COL_GDP_CONTRIBUTION_PERCENTAGE: &str = "GDP_CONTRIBUTION_PERCENTAGE";
pub const COL_QUARTER: &str = "QUARTER";

pub const CANONICAL_COLUMNS: [&str; 8] = [
    COL_DATE,
    COL_CURRENCY,
    COL_REVENUE,
    COL_EXPENSES,
    COL_TAX_INCOME,
    COL_DEBT,
    COL_GDP_CONTRIBUTION_PERCENTAGE,
    COL_QUARTER,
];

/// Raw date formats, tried in order.
pub const DATE_FORMATS: [&str; 2] = ["%Y/%m/%d", "%d-%m-%Y"];

/// Canonical code for Mexican pesos
pub const MXN: &str = "MXN";

/// Lower-cased currency spellings and the code they map to.
pub const CURRENCY_SYNONYMS: [(&str, &str); 5] = [
    ("pesos", MXN),
    ("mex$", MXN),
    ("mex", MXN),
    ("pesoss", MXN),
    ("mxn", MXN),
];

/// Substrings removed from monetary values, applied in this order (case-sensitive).
pub const MONETARY_STRIP_TOKENS: [&str; 7] = [",", "$", "MXN", "mex$", "pesos", "MEX$", "MEX"];

pub const DEFAULT_TABLE_NAME: &str = "nuevo_leon_financials";
pub const SOURCE_FILE_PREFIX: &str = "Nuevo_Leon_Financials";

/// File extensions picked up by directory scans.
pub const SOURCE_EXTENSIONS: [&str; 5] = ["csv", "xlsx", "xls", "xlsb", "ods"];

pub const PIPELINE_NAME: &str = "FinancialDataPipeline";
pub const BULK_PIPELINE_NAME: &str = "BulkFinancialDataPipeline";
