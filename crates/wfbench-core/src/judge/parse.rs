use crate::model::JudgeScore;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MalformedReason {
    NoJson,
    InvalidJson(String),
    MissingScore,
    ScoreNotInteger(String),
    ScoreOutOfRange(i64),
    MissingRationale,
}

impl fmt::Display for MalformedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoJson => f.write_str("no JSON object in judge output"),
            Self::InvalidJson(e) => write!(f, "invalid JSON in judge output: {}", e),
            Self::MissingScore => f.write_str("judge JSON missing 'score'"),
            Self::ScoreNotInteger(v) => write!(f, "judge score is not an integer: {}", v),
            Self::ScoreOutOfRange(v) => write!(f, "judge score out of range: {}", v),
            Self::MissingRationale => f.write_str("judge JSON missing string 'rationale'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JudgeReply {
    pub score: JudgeScore,
    pub rationale: String,
}

/// Extracts and validates `{"score": 0|1|2, "rationale": "..."}` from judge output.
///
/// Prose or code fences around the object are tolerated. The first `{` that
/// starts a complete JSON object wins.
pub fn parse_judge_reply(text: &str) -> Result<JudgeReply, MalformedReason> {
    let obj = first_json_object(text.trim())?;

    let score = match obj.get("score") {
        None | Some(Value::Null) => return Err(MalformedReason::MissingScore),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(v) => v,
            None if n.is_u64() => return Err(MalformedReason::ScoreOutOfRange(i64::MAX)),
            None => return Err(MalformedReason::ScoreNotInteger(n.to_string())),
        },
        Some(other) => return Err(MalformedReason::ScoreNotInteger(other.to_string())),
    };
    let score = JudgeScore::new(score).ok_or(MalformedReason::ScoreOutOfRange(score))?;

    let rationale = obj
        .get("rationale")
        .and_then(Value::as_str)
        .ok_or(MalformedReason::MissingRationale)?
        .trim()
        .to_string();

    Ok(JudgeReply { score, rationale })
}

fn first_json_object(text: &str) -> Result<serde_json::Map<String, Value>, MalformedReason> {
    let mut first_error = None;
    for (idx, _) in text.match_indices('{') {
        let mut stream = serde_json::Deserializer::from_str(&text[idx..]).into_iter::<Value>();
        match stream.next() {
            Some(Ok(Value::Object(map))) => return Ok(map),
            Some(Ok(_)) => {}
            Some(Err(e)) => {
                first_error.get_or_insert_with(|| e.to_string());
            }
            None => {}
        }
    }
    Err(match first_error {
        Some(e) => MalformedReason::InvalidJson(e),
        None => MalformedReason::NoJson,
    })
}
