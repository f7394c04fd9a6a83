use std::io::Read;
use std::path::Path;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use rp_types::{DataError, PricePanel, PriceRow, RpResult};

/// Accepted header names for the asset symbol column, canonical name first.
pub const ASSET_COLUMNS: &[&str] = &["asset", "symbol", "ticker", "asset_name"];
/// Accepted header names for the closing price column.
pub const CLOSE_COLUMNS: &[&str] = &["close", "close_price", "price", "last_price"];
/// Accepted header names for the date column.
pub const DATE_COLUMNS: &[&str] = &["date", "timestamp", "time", "datetime"];

/// How the columns of a price file map onto (asset, date, close).
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnLayout {
    /// One row per (asset, date): `asset,date,close`.
    Long {
        asset: usize,
        close: usize,
        date: Option<usize>,
    },
    /// One row per date, one column per asset: `date,BTC,ETH,...`.
    Wide {
        date: usize,
        assets: Vec<(usize, String)>,
    },
}

/// Output of a load: the panel plus what the loader had to do to get it.
#[derive(Debug, Clone)]
pub struct LoadedPrices {
    pub panel: PricePanel,
    /// True when the input had no date column and dates were generated.
    pub dates_synthesized: bool,
    /// Rows dropped because a field could not be parsed.
    pub skipped_rows: usize,
}

/// CSV price loader with an explicit column-synonym table.
#[derive(Debug, Clone)]
pub struct PriceLoader {
    reference_day: DateTime<Utc>,
}

impl PriceLoader {
    pub fn new() -> Self {
        let today = Utc::now().date_naive();
        Self::with_reference_day(today.and_time(chrono::NaiveTime::MIN).and_utc())
    }

    /// Last day of the sequential range generated when the input has no
    /// date column.
    pub fn with_reference_day(reference_day: DateTime<Utc>) -> Self {
        Self { reference_day }
    }

    /// Load prices from a CSV file.
    pub fn load_csv_file<P: AsRef<Path>>(&self, file_path: P) -> RpResult<LoadedPrices> {
        let path = file_path.as_ref();
        tracing::info!("Loading CSV prices from: {}", path.display());

        let file = std::fs::File::open(path).map_err(|e| DataError::LoadingFailed {
            message: format!("Failed to open CSV file {}: {}", path.display(), e),
        })?;
        let loaded = self.load_csv_reader(file)?;

        tracing::info!(
            assets = loaded.panel.len(),
            observations = loaded.panel.observation_count(),
            skipped = loaded.skipped_rows,
            "Loaded prices from {}",
            path.display()
        );
        Ok(loaded)
    }

    /// Load prices from any CSV source with a header row.
    pub fn load_csv_reader<R: Read>(&self, reader: R) -> RpResult<LoadedPrices> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = rdr
            .headers()
            .map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV headers: {}", e),
            })?
            .clone();
        tracing::debug!("CSV headers: {:?}", headers);

        let layout = detect_layout(&headers)?;

        let mut records = Vec::new();
        for (line_num, result) in rdr.records().enumerate() {
            let record = result.map_err(|e| DataError::LoadingFailed {
                message: format!("Failed to read CSV record at line {}: {}", line_num + 2, e),
            })?;
            records.push(record);
        }

        let (rows, skipped_rows, dates_synthesized) = match &layout {
            ColumnLayout::Long { asset, close, date } => {
                self.long_rows(&records, *asset, *close, *date)
            }
            ColumnLayout::Wide { date, assets } => wide_rows(&records, *date, assets),
        };

        if dates_synthesized {
            tracing::warn!(
                rows = rows.len(),
                "No date column found; generated sequential daily dates ending {}",
                self.reference_day.date_naive()
            );
        }

        let panel = PricePanel::from_rows(rows)?;
        if panel.is_empty() {
            return Err(DataError::EmptyPanel.into());
        }

        Ok(LoadedPrices {
            panel,
            dates_synthesized,
            skipped_rows,
        })
    }

    fn long_rows(
        &self,
        records: &[csv::StringRecord],
        asset_idx: usize,
        close_idx: usize,
        date_idx: Option<usize>,
    ) -> (Vec<PriceRow>, usize, bool) {
        let total = records.len() as i64;
        let mut rows = Vec::with_capacity(records.len());
        let mut skipped = 0;

        for (i, record) in records.iter().enumerate() {
            let line = i + 2;
            let asset = record.get(asset_idx).unwrap_or("");
            if asset.is_empty() {
                tracing::warn!("Skipping record at line {}: empty asset", line);
                skipped += 1;
                continue;
            }

            let close = match parse_price(record.get(close_idx).unwrap_or("")) {
                Ok(close) => close,
                Err(e) => {
                    tracing::warn!("Skipping record at line {}: {}", line, e);
                    skipped += 1;
                    continue;
                }
            };

            let date = match date_idx {
                Some(idx) => match parse_timestamp(record.get(idx).unwrap_or("")) {
                    Ok(date) => date,
                    Err(e) => {
                        tracing::warn!("Skipping record at line {}: {}", line, e);
                        skipped += 1;
                        continue;
                    }
                },
                None => self.reference_day - Duration::days(total - 1 - i as i64),
            };

            rows.push(PriceRow {
                asset: asset.to_string(),
                date,
                close,
            });
        }

        (rows, skipped, date_idx.is_none())
    }
}

impl Default for PriceLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn wide_rows(
    records: &[csv::StringRecord],
    date_idx: usize,
    assets: &[(usize, String)],
) -> (Vec<PriceRow>, usize, bool) {
    let mut rows = Vec::new();
    let mut skipped = 0;

    for (i, record) in records.iter().enumerate() {
        let date = match parse_timestamp(record.get(date_idx).unwrap_or("")) {
            Ok(date) => date,
            Err(e) => {
                tracing::warn!("Skipping record at line {}: {}", i + 2, e);
                skipped += 1;
                continue;
            }
        };
        for (idx, asset) in assets {
            let cell = record.get(*idx).unwrap_or("");
            // Blank cells are gaps for that asset only.
            if cell.is_empty() {
                continue;
            }
            match parse_price(cell) {
                Ok(close) => rows.push(PriceRow {
                    asset: asset.clone(),
                    date,
                    close,
                }),
                Err(e) => {
                    tracing::warn!("Skipping {} at line {}: {}", asset, i + 2, e);
                    skipped += 1;
                }
            }
        }
    }

    (rows, skipped, false)
}

fn find_column(headers: &csv::StringRecord, synonyms: &[&str]) -> Option<usize> {
    synonyms.iter().find_map(|name| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
    })
}

/// Map CSV headers onto a [`ColumnLayout`] using the synonym tables.
pub fn detect_layout(headers: &csv::StringRecord) -> Result<ColumnLayout, DataError> {
    let found = || headers.iter().map(str::to_string).collect::<Vec<_>>();

    let asset = find_column(headers, ASSET_COLUMNS);
    let close = find_column(headers, CLOSE_COLUMNS);
    let date = find_column(headers, DATE_COLUMNS);

    match (asset, close, date) {
        (Some(asset), Some(close), date) => Ok(ColumnLayout::Long { asset, close, date }),
        (Some(_), None, _) => Err(DataError::MissingColumn {
            column: "close".to_string(),
            found: found(),
        }),
        (None, None, Some(date)) if headers.len() > 1 => {
            let assets = headers
                .iter()
                .enumerate()
                .filter(|(i, h)| *i != date && !h.trim().is_empty())
                .map(|(i, h)| (i, h.trim().to_string()))
                .collect();
            Ok(ColumnLayout::Wide { date, assets })
        }
        _ => Err(DataError::MissingColumn {
            column: "asset".to_string(),
            found: found(),
        }),
    }
}

fn parse_price(value_str: &str) -> Result<f64, DataError> {
    if value_str.is_empty() {
        return Err(DataError::ParseError {
            message: "Empty value for field: close".to_string(),
        });
    }
    value_str.parse::<f64>().map_err(|e| DataError::ParseError {
        message: format!("Could not parse close value '{}': {}", value_str, e),
    })
}

/// Parse a timestamp string into `DateTime<Utc>`. Date-only values land at
/// midnight UTC.
pub fn parse_timestamp(timestamp_str: &str) -> Result<DateTime<Utc>, DataError> {
    if let Ok(naive_date) = chrono::NaiveDate::parse_from_str(timestamp_str, "%Y-%m-%d") {
        return Ok(naive_date.and_time(chrono::NaiveTime::MIN).and_utc());
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(timestamp_str) {
        return Ok(dt.with_timezone(&Utc));
    }

    let formats = [
        "%Y-%m-%d %H:%M:%S",  // 2023-01-01 10:30:00
        "%Y-%m-%d %H:%M",     // 2023-01-01 10:30
        "%Y/%m/%d %H:%M:%S",  // 2023/01/01 10:30:00
        "%m/%d/%Y %H:%M:%S",  // 01/01/2023 10:30:00
        "%Y-%m-%dT%H:%M:%S",  // 2023-01-01T10:30:00
        "%Y-%m-%dT%H:%M:%SZ", // 2023-01-01T10:30:00Z
    ];
    for format in &formats {
        if let Ok(naive_dt) = NaiveDateTime::parse_from_str(timestamp_str, format) {
            return Ok(naive_dt.and_utc());
        }
    }

    for format in ["%Y/%m/%d", "%m/%d/%Y", "%d-%m-%Y"] {
        if let Ok(naive_date) = chrono::NaiveDate::parse_from_str(timestamp_str, format) {
            return Ok(naive_date.and_time(chrono::NaiveTime::MIN).and_utc());
        }
    }

    // Unix seconds
    if let Ok(timestamp) = timestamp_str.parse::<i64>() {
        if let Some(dt) = DateTime::from_timestamp(timestamp, 0) {
            return Ok(dt);
        }
    }

    Err(DataError::ParseError {
        message: format!("Could not parse timestamp: {}", timestamp_str),
    })
}
