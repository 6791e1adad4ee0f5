//! Header aggregation — administrative/location metadata for a roll.
//!
//! A roll's header (constituency, part, section, polling station, geography)
//! usually appears only on the first page or two of the first few documents.
//! Fields are merged across pages and units with first-non-empty-wins
//! semantics: a value, once set, is never overwritten — in particular not by
//! a later empty value.

use serde::{Deserialize, Serialize};

/// Administrative/location metadata shared by every record of a job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeaderInfo {
    pub ac_no_name: String,
    pub part_number: String,
    pub section_number: String,
    pub section_name: String,
    pub ps_name: String,
    pub state: String,
    pub gram: String,
    pub thana: String,
    pub panchayat: String,
    pub block: String,
    pub tahsil: String,
    pub jilla: String,
}

impl HeaderInfo {
    /// True if no field carries a value.
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|f| f.is_empty())
    }

    /// Merge `incoming` into `self`: each field still empty on `self` takes
    /// the incoming value; already-set fields are left untouched.
    pub fn merge_missing(&mut self, incoming: &HeaderInfo) {
        merge_field(&mut self.ac_no_name, &incoming.ac_no_name);
        merge_field(&mut self.part_number, &incoming.part_number);
        merge_field(&mut self.section_number, &incoming.section_number);
        merge_field(&mut self.section_name, &incoming.section_name);
        merge_field(&mut self.ps_name, &incoming.ps_name);
        merge_field(&mut self.state, &incoming.state);
        merge_field(&mut self.gram, &incoming.gram);
        merge_field(&mut self.thana, &incoming.thana);
        merge_field(&mut self.panchayat, &incoming.panchayat);
        merge_field(&mut self.block, &incoming.block);
        merge_field(&mut self.tahsil, &incoming.tahsil);
        merge_field(&mut self.jilla, &incoming.jilla);
    }

    fn fields(&self) -> [&String; 12] {
        [
            &self.ac_no_name,
            &self.part_number,
            &self.section_number,
            &self.section_name,
            &self.ps_name,
            &self.state,
            &self.gram,
            &self.thana,
            &self.panchayat,
            &self.block,
            &self.tahsil,
            &self.jilla,
        ]
    }
}

fn merge_field(target: &mut String, incoming: &str) {
    if target.is_empty() && !incoming.is_empty() {
        *target = incoming.to_string();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_header_reports_empty() {
        assert!(HeaderInfo::default().is_empty());
    }

    #[test]
    fn merge_fills_only_empty_fields() {
        let mut base = HeaderInfo {
            jilla: "Lucknow".into(),
            ..Default::default()
        };
        let incoming = HeaderInfo {
            jilla: "Kanpur".into(),
            gram: "Rampur".into(),
            ..Default::default()
        };

        base.merge_missing(&incoming);

        assert_eq!(base.jilla, "Lucknow", "set field must not be overwritten");
        assert_eq!(base.gram, "Rampur", "empty field takes incoming value");
    }

    #[test]
    fn empty_incoming_never_clears() {
        let mut base = HeaderInfo {
            ps_name: "Primary School".into(),
            ..Default::default()
        };
        base.merge_missing(&HeaderInfo::default());
        assert_eq!(base.ps_name, "Primary School");
    }

    #[test]
    fn first_non_empty_wins_across_three_units() {
        // Unit 1 contributes an empty jilla, unit 2 a real one,
        // unit 3 a different real one — unit 2's value must stick.
        let mut job_header = HeaderInfo::default();

        job_header.merge_missing(&HeaderInfo::default());
        assert!(job_header.jilla.is_empty());

        job_header.merge_missing(&HeaderInfo {
            jilla: "Varanasi".into(),
            ..Default::default()
        });
        assert_eq!(job_header.jilla, "Varanasi");

        job_header.merge_missing(&HeaderInfo {
            jilla: "Agra".into(),
            ..Default::default()
        });
        assert_eq!(job_header.jilla, "Varanasi");
    }
}
