// Persisted category → integer code mapping shared by training and serving.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::features::{FeatureRow, FeatureVector, InningsRecord};

/// Format version of the encodings file.
pub const ENCODING_SCHEMA_VERSION: u32 = 1;

/// Code for any value of a field the table has no entry for. Never a
/// fitted code, since a fitted field holds fewer than `u32::MAX` values.
pub const MISSING_FIELD_CODE: u32 = u32::MAX;

/// The categorical input columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CategoricalField {
    Venue,
    Team,
    Opposition,
    TossWinner,
    TossChoice,
}

impl CategoricalField {
    pub const ALL: [CategoricalField; 5] = [
        CategoricalField::Venue,
        CategoricalField::Team,
        CategoricalField::Opposition,
        CategoricalField::TossWinner,
        CategoricalField::TossChoice,
    ];

    /// Column name, matching the feature column list.
    pub fn name(self) -> &'static str {
        match self {
            CategoricalField::Venue => "venue",
            CategoricalField::Team => "team",
            CategoricalField::Opposition => "opposition",
            CategoricalField::TossWinner => "toss_winner",
            CategoricalField::TossChoice => "toss_choice",
        }
    }

    /// This field's raw value on an innings record.
    pub fn value_of(self, record: &InningsRecord) -> &str {
        match self {
            CategoricalField::Venue => &record.venue,
            CategoricalField::Team => &record.team,
            CategoricalField::Opposition => &record.opposition,
            CategoricalField::TossWinner => &record.toss_winner,
            CategoricalField::TossChoice => &record.toss_choice,
        }
    }
}

/// Codes for one field. Trimmed values are assigned `0..n` in lexical order
/// and the unknown code is `n`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldEncoding {
    pub codes: BTreeMap<String, u32>,
    pub unknown_code: u32,
}

impl FieldEncoding {
    fn fit<'a>(values: impl IntoIterator<Item = &'a str>) -> Self {
        let distinct: BTreeSet<&str> = values.into_iter().map(str::trim).collect();
        let codes: BTreeMap<String, u32> = distinct
            .into_iter()
            .zip(0u32..)
            .map(|(value, code)| (value.to_string(), code))
            .collect();
        let unknown_code = codes.len() as u32;
        Self {
            codes,
            unknown_code,
        }
    }

    pub fn encode(&self, value: &str) -> u32 {
        self.codes
            .get(value.trim())
            .copied()
            .unwrap_or(self.unknown_code)
    }
}

/// The full encoding artifact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodingTable {
    pub schema_version: u32,
    /// Training run this table was fit in. A model trained against a
    /// different version must not be paired with it.
    pub version: String,
    /// Keyed by field name.
    pub fields: BTreeMap<String, FieldEncoding>,
}

impl EncodingTable {
    /// Derive codes from the categorical values present in `rows`.
    pub fn fit<'a, I>(rows: I, version: impl Into<String>) -> Self
    where
        I: IntoIterator<Item = &'a FeatureRow>,
        I::IntoIter: Clone,
    {
        let rows = rows.into_iter();
        let fields = CategoricalField::ALL
            .iter()
            .map(|&field| {
                let values = rows.clone().map(move |row| field.value_of(&row.record));
                (field.name().to_string(), FieldEncoding::fit(values))
            })
            .collect();
        Self {
            schema_version: ENCODING_SCHEMA_VERSION,
            version: version.into(),
            fields,
        }
    }

    /// Code for `value` in `field`, or that field's unknown code when the
    /// value was not seen during fitting. A field absent from the table
    /// encodes everything as [`MISSING_FIELD_CODE`].
    pub fn encode(&self, field: CategoricalField, value: &str) -> u32 {
        match self.fields.get(field.name()) {
            Some(encoding) => encoding.encode(value),
            None => MISSING_FIELD_CODE,
        }
    }

    pub fn unknown_code(&self, field: CategoricalField) -> u32 {
        self.fields
            .get(field.name())
            .map_or(MISSING_FIELD_CODE, |encoding| encoding.unknown_code)
    }

    /// Whether every categorical field is present.
    pub fn is_complete(&self) -> bool {
        CategoricalField::ALL
            .iter()
            .all(|field| self.fields.contains_key(field.name()))
    }

    /// Encode a training row into the fixed column order.
    pub fn encode_row(&self, row: &FeatureRow) -> FeatureVector {
        let r = &row.record;
        [
            f64::from(r.season),
            f64::from(self.encode(CategoricalField::Venue, &r.venue)),
            f64::from(self.encode(CategoricalField::Team, &r.team)),
            f64::from(self.encode(CategoricalField::Opposition, &r.opposition)),
            f64::from(self.encode(CategoricalField::TossWinner, &r.toss_winner)),
            f64::from(self.encode(CategoricalField::TossChoice, &r.toss_choice)),
            f64::from(r.innings),
            row.team_avg_runs_5,
            row.team_avg_runs_all,
            row.venue_avg_runs,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn row(venue: &str, team: &str, opposition: &str, toss_choice: &str) -> FeatureRow {
        FeatureRow {
            record: InningsRecord {
                match_id: 1,
                season: 2021,
                match_date: NaiveDate::from_ymd_opt(2021, 4, 9).unwrap(),
                venue: venue.into(),
                team: team.into(),
                opposition: opposition.into(),
                toss_winner: team.into(),
                toss_choice: toss_choice.into(),
                innings: 1,
                runs: 160,
            },
            team_avg_runs_5: 150.0,
            team_avg_runs_all: 155.0,
            venue_avg_runs: 165.0,
        }
    }

    fn fixture() -> EncodingTable {
        EncodingTable::fit(
            &[
                row("Wankhede Stadium", "Mumbai Indians", "Chennai Super Kings", "bat"),
                row("Eden Gardens", "Kolkata Knight Riders", "Mumbai Indians", "field"),
                row("Wankhede Stadium", "Chennai Super Kings", "Mumbai Indians", "field"),
            ],
            "ipl_test",
        )
    }

    #[test]
    fn codes_follow_lexical_order() {
        let table = fixture();
        assert_eq!(table.encode(CategoricalField::Venue, "Eden Gardens"), 0);
        assert_eq!(table.encode(CategoricalField::Venue, "Wankhede Stadium"), 1);
        assert_eq!(table.encode(CategoricalField::Team, "Chennai Super Kings"), 0);
        assert_eq!(table.encode(CategoricalField::Team, "Kolkata Knight Riders"), 1);
        assert_eq!(table.encode(CategoricalField::Team, "Mumbai Indians"), 2);
        assert_eq!(table.encode(CategoricalField::TossChoice, "bat"), 0);
        assert_eq!(table.encode(CategoricalField::TossChoice, "field"), 1);
    }

    #[test]
    fn fields_are_encoded_independently() {
        let table = fixture();
        // Opposition only saw two teams, so its codes differ from `team`.
        assert_eq!(table.encode(CategoricalField::Opposition, "Chennai Super Kings"), 0);
        assert_eq!(table.encode(CategoricalField::Opposition, "Mumbai Indians"), 1);
        assert_eq!(table.unknown_code(CategoricalField::Opposition), 2);
    }

    #[test]
    fn repeated_encode_is_stable() {
        let table = fixture();
        let first = table.encode(CategoricalField::Venue, "Wankhede Stadium");
        for _ in 0..10 {
            assert_eq!(table.encode(CategoricalField::Venue, "Wankhede Stadium"), first);
        }
    }

    #[test]
    fn unseen_value_gets_unknown_code_without_collision() {
        let table = fixture();
        let unknown = table.encode(CategoricalField::Venue, "Narendra Modi Stadium");
        assert_eq!(unknown, table.unknown_code(CategoricalField::Venue));
        assert_eq!(unknown, 2);
        let known: BTreeSet<u32> = table.fields["venue"].codes.values().copied().collect();
        assert!(!known.contains(&unknown));
        assert_eq!(table.encode(CategoricalField::Venue, ""), unknown);
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        let table = fixture();
        assert_eq!(table.encode(CategoricalField::Venue, "  Eden Gardens "), 0);
    }

    #[test]
    fn fitted_values_are_trimmed_like_lookups() {
        let table = EncodingTable::fit(
            &[
                row("Wankhede Stadium ", "Mumbai Indians", "Chennai Super Kings", "bat"),
                row(" Eden Gardens", "Kolkata Knight Riders", "Mumbai Indians", "field "),
            ],
            "ipl_test",
        );
        let venue = &table.fields["venue"];
        assert!(venue.codes.contains_key("Wankhede Stadium"));
        assert!(!venue.codes.contains_key("Wankhede Stadium "));
        assert_eq!(table.encode(CategoricalField::Venue, "Wankhede Stadium"), 1);
        assert_eq!(table.encode(CategoricalField::Venue, "Wankhede Stadium "), 1);
        assert_eq!(table.unknown_code(CategoricalField::Venue), 2);
        assert_eq!(table.encode(CategoricalField::TossChoice, "field"), 1);

        let v = table.encode_row(&row("Wankhede Stadium", "Mumbai Indians", "Chennai Super Kings", "bat"));
        assert_eq!(v[1], 1.0);
    }

    #[test]
    fn duplicates_after_trimming_share_one_code() {
        let table = EncodingTable::fit(
            &[
                row("Wankhede Stadium", "Mumbai Indians", "Chennai Super Kings", "bat"),
                row("Wankhede Stadium  ", "Mumbai Indians", "Chennai Super Kings", "bat"),
            ],
            "ipl_test",
        );
        assert_eq!(table.fields["venue"].codes.len(), 1);
        assert_eq!(table.unknown_code(CategoricalField::Venue), 1);
    }

    #[test]
    fn missing_field_never_collides_with_fitted_codes() {
        let mut table = fixture();
        table.fields.remove("venue");
        assert!(!table.is_complete());

        let code = table.encode(CategoricalField::Venue, "Eden Gardens");
        assert_eq!(code, MISSING_FIELD_CODE);
        assert_eq!(table.unknown_code(CategoricalField::Venue), MISSING_FIELD_CODE);
        assert_ne!(code, 0);
        // Other fields keep their fitted codes.
        assert_eq!(table.encode(CategoricalField::Team, "Chennai Super Kings"), 0);
    }

    #[test]
    fn survives_json_round_trip() {
        let table = fixture();
        let json = serde_json::to_string(&table).unwrap();
        let back: EncodingTable = serde_json::from_str(&json).unwrap();
        assert_eq!(back, table);
        assert!(back.is_complete());
        assert_eq!(back.version, "ipl_test");
    }

    #[test]
    fn encode_row_uses_fixed_column_order() {
        let table = fixture();
        let v = table.encode_row(&row("Eden Gardens", "Mumbai Indians", "Chennai Super Kings", "bat"));
        assert_eq!(v, [2021.0, 0.0, 2.0, 0.0, 2.0, 0.0, 1.0, 150.0, 155.0, 165.0]);
    }

    #[test]
    fn empty_fit_has_zero_unknown_codes() {
        let table = EncodingTable::fit(&[], "ipl_empty");
        for field in CategoricalField::ALL {
            assert_eq!(table.unknown_code(field), 0);
            assert_eq!(table.encode(field, "anything"), 0);
        }
    }
}
