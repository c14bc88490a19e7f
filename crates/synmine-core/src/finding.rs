//! Finding record shared by the matcher and the sinks

use serde::{Deserialize, Serialize};

/// One matched identifier occurrence with its captured context.
///
/// Never mutated after the matcher creates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    /// Document identifier (`pmc:PMC…` for archive articles, file name otherwise)
    #[serde(rename = "pmcid")]
    pub source_id: String,
    pub synapse_id: String,
    pub context_before: String,
    pub context_after: String,
    /// Character offset of the match in the document text
    pub position: usize,
}

impl Finding {
    /// Full match window: before + identifier + after
    pub fn context(&self) -> String {
        let mut s = String::with_capacity(
            self.context_before.len() + self.synapse_id.len() + self.context_after.len(),
        );
        s.push_str(&self.context_before);
        s.push_str(&self.synapse_id);
        s.push_str(&self.context_after);
        s
    }

    pub fn to_row(&self) -> FindingRow {
        FindingRow {
            pmcid: self.source_id.clone(),
            synapse_id: self.synapse_id.clone(),
            context: self.context(),
        }
    }
}

/// One CSV line. Column order is fixed: `pmcid, synapse_id, context`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FindingRow {
    pub pmcid: String,
    pub synapse_id: String,
    pub context: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding() -> Finding {
        Finding {
            source_id: "pmc:PMC1".into(),
            synapse_id: "syn1234567".into(),
            context_before: "see ".into(),
            context_after: " for".into(),
            position: 4,
        }
    }

    #[test]
    fn context_joins_window() {
        assert_eq!(finding().context(), "see syn1234567 for");
    }

    #[test]
    fn row_keeps_identity() {
        let row = finding().to_row();
        assert_eq!(row.pmcid, "pmc:PMC1");
        assert_eq!(row.synapse_id, "syn1234567");
        assert_eq!(row.context, "see syn1234567 for");
    }

    #[test]
    fn json_uses_pmcid_key() {
        let json = serde_json::to_value(finding()).unwrap();
        assert_eq!(json["pmcid"], "pmc:PMC1");
        assert_eq!(json["position"], 4);
    }
}
