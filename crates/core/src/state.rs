use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::StateError;

/// Pipeline stage a file has reached.
///
/// Persisted as the short code (e.g. `"0100"`) rather than the variant name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum FileStateCode {
    Pending,
    Downloaded,
    Unzipped,
    Unpickled,
    Unknown,
    Error,
}

const STATE_CODES: &[(FileStateCode, &str, &str)] = &[
    (FileStateCode::Pending, "0100", "Pending"),
    (FileStateCode::Downloaded, "0201", "Downloaded"),
    (FileStateCode::Unzipped, "0202", "Unzipped"),
    (FileStateCode::Unpickled, "0203", "Unpickled"),
    (FileStateCode::Unknown, "unkn", "Unknown"),
    (FileStateCode::Error, "err", "Error"),
];

impl FileStateCode {
    pub fn code(self) -> &'static str {
        STATE_CODES
            .iter()
            .find(|(state, _, _)| *state == self)
            .map(|(_, code, _)| *code)
            .unwrap_or("unkn")
    }

    pub fn description(self) -> &'static str {
        STATE_CODES
            .iter()
            .find(|(state, _, _)| *state == self)
            .map(|(_, _, desc)| *desc)
            .unwrap_or("Unknown")
    }

    pub fn from_code(code: &str) -> Result<Self, StateError> {
        STATE_CODES
            .iter()
            .find(|(_, c, _)| *c == code)
            .map(|(state, _, _)| *state)
            .ok_or_else(|| StateError::UnknownStateCode(code.to_string()))
    }

    /// The pipeline processor that moves a file out of this state.
    pub fn pipeline_role(self) -> Result<PipelineRole, StateError> {
        match self {
            FileStateCode::Pending => Ok(PipelineRole::Transfer),
            FileStateCode::Downloaded => Ok(PipelineRole::Unpack),
            FileStateCode::Unzipped => Ok(PipelineRole::Decode),
            other => Err(StateError::NoProcessorForState(other.code().to_string())),
        }
    }
}

impl From<FileStateCode> for &'static str {
    fn from(state: FileStateCode) -> Self {
        state.code()
    }
}

impl TryFrom<String> for FileStateCode {
    type Error = StateError;

    fn try_from(code: String) -> Result<Self, StateError> {
        Self::from_code(&code)
    }
}

impl fmt::Display for FileStateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.description(), self.code())
    }
}

/// Scheduling lifecycle of a file, independent of its pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileProcessStep {
    New,
    Scheduled,
    Processing,
    Finished,
}

impl FileProcessStep {
    pub fn as_str(self) -> &'static str {
        match self {
            FileProcessStep::New => "new",
            FileProcessStep::Scheduled => "scheduled",
            FileProcessStep::Processing => "processing",
            FileProcessStep::Finished => "finished",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StateError> {
        match s {
            "new" => Ok(FileProcessStep::New),
            "scheduled" => Ok(FileProcessStep::Scheduled),
            "processing" => Ok(FileProcessStep::Processing),
            "finished" => Ok(FileProcessStep::Finished),
            other => Err(StateError::UnknownStep(other.to_string())),
        }
    }
}

impl fmt::Display for FileProcessStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container role launched for one pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "&'static str", try_from = "String")]
pub enum PipelineRole {
    /// Moves the file from the pending bucket into processing.
    Transfer,
    /// Unpacks the transferred archive.
    Unpack,
    /// Decodes the unpacked payload.
    Decode,
}

impl PipelineRole {
    pub const ALL: [PipelineRole; 3] = [PipelineRole::Transfer, PipelineRole::Unpack, PipelineRole::Decode];

    /// Deployment name of the container image serving this role.
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineRole::Transfer => "synthetic-gfc",
            PipelineRole::Unpack => "synthetic-unzip",
            PipelineRole::Decode => "synthetic-unpickle",
        }
    }

    pub fn stage_name(self) -> &'static str {
        match self {
            PipelineRole::Transfer => "transfer",
            PipelineRole::Unpack => "unpack",
            PipelineRole::Decode => "decode",
        }
    }

    pub fn parse(s: &str) -> Result<Self, StateError> {
        PipelineRole::ALL
            .into_iter()
            .find(|role| role.as_str() == s || role.stage_name() == s)
            .ok_or_else(|| StateError::UnknownRole(s.to_string()))
    }
}

impl From<PipelineRole> for &'static str {
    fn from(role: PipelineRole) -> Self {
        role.as_str()
    }
}

impl TryFrom<String> for PipelineRole {
    type Error = StateError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl fmt::Display for PipelineRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_round_trip_through_lookup_table() {
        for (state, code, _) in STATE_CODES {
            assert_eq!(state.code(), *code);
            assert_eq!(FileStateCode::from_code(code).unwrap(), *state);
        }
    }

    #[test]
    fn unknown_code_is_rejected() {
        assert_eq!(
            FileStateCode::from_code("9999"),
            Err(StateError::UnknownStateCode("9999".into()))
        );
    }

    #[test]
    fn state_serializes_as_code() {
        let json = serde_json::to_string(&FileStateCode::Downloaded).unwrap();
        assert_eq!(json, "\"0201\"");
        let back: FileStateCode = serde_json::from_str("\"err\"").unwrap();
        assert_eq!(back, FileStateCode::Error);
    }

    #[test]
    fn state_converts_from_owned_code() {
        assert_eq!(FileStateCode::try_from("err".to_string()), Ok(FileStateCode::Error));
        assert!(FileStateCode::try_from("0000x".to_string()).is_err());
    }

    #[test]
    fn accompanying_processor_per_state() {
        assert_eq!(FileStateCode::Pending.pipeline_role().unwrap(), PipelineRole::Transfer);
        assert_eq!(FileStateCode::Downloaded.pipeline_role().unwrap(), PipelineRole::Unpack);
        assert_eq!(FileStateCode::Unzipped.pipeline_role().unwrap(), PipelineRole::Decode);
        assert!(FileStateCode::Unpickled.pipeline_role().is_err());
        assert!(FileStateCode::Error.pipeline_role().is_err());
    }

    #[test]
    fn role_parses_from_deployment_or_stage_name() {
        assert_eq!(PipelineRole::parse("synthetic-unzip").unwrap(), PipelineRole::Unpack);
        assert_eq!(PipelineRole::parse("decode").unwrap(), PipelineRole::Decode);
        assert!(PipelineRole::parse("synthetic-foo").is_err());
    }

    #[test]
    fn step_serializes_lowercase() {
        let json = serde_json::to_string(&FileProcessStep::Scheduled).unwrap();
        assert_eq!(json, "\"scheduled\"");
        assert_eq!(FileProcessStep::parse("finished").unwrap(), FileProcessStep::Finished);
    }
}
