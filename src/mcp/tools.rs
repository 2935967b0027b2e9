//! Tool definitions and dispatch.
//!
//! Every transport shares this one table: the schemas advertised by
//! `tools/list` and the handlers run by `tools/call` live side by side in
//! [`Tool`].
//!
//! Tool failures never become protocol errors. They are returned as a
//! [`ToolCallResult`] with `isError` set and a JSON body naming the error, the
//! tool and the arguments it was called with.

use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

use crate::calendar::{QueryError, Region, VacationQueryEngine};

/// Earliest year advertised in the `get_vacation_periods` schema.
pub const MIN_YEAR: i32 = 2019;

/// Latest year advertised in the `get_vacation_periods` schema.
pub const MAX_YEAR: i32 = 2028;

const SUPPORTED_REGIONS_DESCRIPTION: &str =
    "These are the available regions for school vacation lookups";

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // serde's skip_serializing_if requires a predicate fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Returns the text of the first content item.
    #[must_use]
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|c| match c {
            ToolContent::Text { text } => text.as_str(),
        })
    }
}

/// Errors raised while running a tool.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ToolError {
    /// No tool with this name exists.
    #[error("Unknown tool: {0}")]
    UnknownTool(String),

    /// A required argument is absent.
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    /// An argument has the wrong type or shape.
    #[error("Invalid parameter '{name}': {message}")]
    InvalidParameter {
        /// Argument name.
        name: &'static str,
        /// What is wrong with it.
        message: &'static str,
    },

    /// The calendar query failed.
    #[error(transparent)]
    Query(#[from] QueryError),
}

/// The tools exposed by this server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tool {
    /// `check_school_vacation`
    CheckSchoolVacation,
    /// `get_vacation_periods`
    GetVacationPeriods,
    /// `get_supported_regions`
    GetSupportedRegions,
}

impl Tool {
    /// All tools, in `tools/list` order.
    pub const ALL: [Self; 3] = [
        Self::CheckSchoolVacation,
        Self::GetVacationPeriods,
        Self::GetSupportedRegions,
    ];

    /// Returns the protocol name of the tool.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::CheckSchoolVacation => "check_school_vacation",
            Self::GetVacationPeriods => "get_vacation_periods",
            Self::GetSupportedRegions => "get_supported_regions",
        }
    }

    /// Looks a tool up by its protocol name.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|tool| tool.name() == name)
    }

    /// Returns the `tools/list` entry for this tool.
    #[must_use]
    pub fn definition(self) -> ToolDefinition {
        let regions: Vec<&str> = Region::ALL.iter().map(|r| r.as_str()).collect();

        let (description, input_schema) = match self {
            Self::CheckSchoolVacation => (
                "Check if a specific date is a school vacation day in a given region",
                json!({
                    "type": "object",
                    "properties": {
                        "date": {
                            "type": "string",
                            "description": "Date in DD/MM/YYYY format (e.g., \"01/01/2019\")"
                        },
                        "region": {
                            "type": "string",
                            "description": format!("Region to check ({})", regions.join(", ")),
                            "enum": regions
                        }
                    },
                    "required": ["date", "region"]
                }),
            ),
            Self::GetVacationPeriods => (
                "Get all school vacation periods for a region, optionally filtered by year",
                json!({
                    "type": "object",
                    "properties": {
                        "region": {
                            "type": "string",
                            "description": "Region to get vacation periods for",
                            "enum": regions
                        },
                        "year": {
                            "type": "number",
                            "description": format!("Optional year to filter vacation periods ({MIN_YEAR}-{MAX_YEAR})"),
                            "minimum": MIN_YEAR,
                            "maximum": MAX_YEAR
                        }
                    },
                    "required": ["region"]
                }),
            ),
            Self::GetSupportedRegions => (
                "Get list of all supported regions for school vacation lookups",
                json!({
                    "type": "object",
                    "properties": {}
                }),
            ),
        };

        ToolDefinition {
            name: self.name().to_string(),
            description: Some(description.to_string()),
            input_schema,
        }
    }

    /// Runs the tool and returns its JSON payload.
    ///
    /// # Errors
    ///
    /// Returns an error if an argument is missing or malformed, or the query
    /// itself fails.
    pub fn call(self, engine: &VacationQueryEngine, arguments: &Value) -> Result<Value, ToolError> {
        match self {
            Self::CheckSchoolVacation => {
                let date = required_str(arguments, "date")?;
                let region = required_str(arguments, "region")?;
                let is_vacation = engine.is_vacation_day(date, region)?;
                let message = if is_vacation {
                    format!("{date} is a school vacation day in {region}")
                } else {
                    format!("{date} is not a school vacation day in {region}")
                };
                Ok(json!({
                    "date": date,
                    "region": region,
                    "isSchoolVacation": is_vacation,
                    "message": message,
                }))
            }
            Self::GetVacationPeriods => {
                let region = required_str(arguments, "region")?;
                let year = optional_year(arguments)?;
                let periods = engine.list_vacation_periods(region, year)?;
                Ok(json!({
                    "region": region,
                    "year": year.map_or_else(|| json!("all years"), |y| json!(y)),
                    "vacationPeriods": periods,
                    "totalPeriods": periods.len(),
                }))
            }
            Self::GetSupportedRegions => Ok(json!({
                "supportedRegions": engine.list_supported_regions(),
                "description": SUPPORTED_REGIONS_DESCRIPTION,
            })),
        }
    }
}

/// Returns the definitions of all tools.
#[must_use]
pub fn definitions() -> Vec<ToolDefinition> {
    Tool::ALL.into_iter().map(Tool::definition).collect()
}

/// Dispatches a tool call by name.
///
/// Errors are folded into the result so that one failing call never affects
/// the connection or session it arrived on.
#[must_use]
pub fn call_tool(engine: &VacationQueryEngine, name: &str, arguments: &Value) -> ToolCallResult {
    let outcome = Tool::from_name(name)
        .ok_or_else(|| ToolError::UnknownTool(name.to_string()))
        .and_then(|tool| tool.call(engine, arguments));

    match outcome {
        Ok(payload) => ToolCallResult::text(pretty(&payload)),
        Err(e) => {
            tracing::warn!(tool = name, error = %e, "Tool call failed");
            let payload = json!({
                "error": e.to_string(),
                "tool": name,
                "arguments": arguments,
            });
            ToolCallResult::error(pretty(&payload))
        }
    }
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn required_str<'a>(arguments: &'a Value, name: &'static str) -> Result<&'a str, ToolError> {
    match arguments.get(name) {
        None | Some(Value::Null) => Err(ToolError::MissingParameter(name)),
        Some(value) => value.as_str().ok_or(ToolError::InvalidParameter {
            name,
            message: "expected a string",
        }),
    }
}

/// Reads the optional `year` argument.
///
/// Whole-number floats such as `2020.0` are accepted since some clients send
/// every JSON number as a double.
#[allow(clippy::cast_possible_truncation)] // guarded by the fract() and range checks
fn optional_year(arguments: &Value) -> Result<Option<i32>, ToolError> {
    let invalid = ToolError::InvalidParameter {
        name: "year",
        message: "expected an integer year",
    };

    match arguments.get("year") {
        None | Some(Value::Null) => Ok(None),
        Some(value) => value
            .as_i64()
            .or_else(|| {
                value
                    .as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() <= f64::from(i32::MAX))
                    .map(|f| f as i64)
            })
            .and_then(|y| i32::try_from(y).ok())
            .map(Some)
            .ok_or(invalid),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calendar::CalendarTable;

    fn engine() -> VacationQueryEngine {
        let mut source = String::from("header\n");
        for (date, flanders) in [
            ("30/12/2019", false),
            ("31/12/2019", true),
            ("01/01/2020", true),
            ("02/01/2020", false),
        ] {
            let mut fields = vec![""; 20];
            fields[0] = date;
            fields[4] = if flanders { "1" } else { "0" };
            source.push_str(&fields.join(";"));
            source.push('\n');
        }
        VacationQueryEngine::new(CalendarTable::parse(&source).unwrap())
    }

    fn payload(result: &ToolCallResult) -> Value {
        serde_json::from_str(result.first_text().unwrap()).unwrap()
    }

    #[test]
    fn tool_definitions_valid() {
        let tools = definitions();
        assert_eq!(tools.len(), 3);

        for tool in &tools {
            assert!(!tool.name.is_empty());
            assert!(tool.input_schema.is_object());
            assert_eq!(Tool::from_name(&tool.name).map(Tool::name), Some(tool.name.as_str()));
        }
    }

    #[test]
    fn schema_lists_canonical_regions() {
        let def = Tool::CheckSchoolVacation.definition();
        let regions = &def.input_schema["properties"]["region"]["enum"];
        assert_eq!(regions.as_array().unwrap().len(), Region::ALL.len());
        assert_eq!(regions[0], "flanders");
        assert_eq!(def.input_schema["required"], json!(["date", "region"]));
    }

    #[test]
    fn check_school_vacation_echoes_input() {
        let result = call_tool(
            &engine(),
            "check_school_vacation",
            &json!({"date": "31/12/2019", "region": "Vlaanderen"}),
        );
        assert!(!result.is_error);

        let body = payload(&result);
        assert_eq!(body["isSchoolVacation"], true);
        assert_eq!(body["region"], "Vlaanderen");
        assert_eq!(body["message"], "31/12/2019 is a school vacation day in Vlaanderen");
    }

    #[test]
    fn check_school_vacation_negative_message() {
        let result = call_tool(
            &engine(),
            "check_school_vacation",
            &json!({"date": "02/01/2020", "region": "flanders"}),
        );
        let body = payload(&result);
        assert_eq!(body["isSchoolVacation"], false);
        assert_eq!(body["message"], "02/01/2020 is not a school vacation day in flanders");
    }

    fn keys(body: &Value) -> Vec<&str> {
        body.as_object().unwrap().keys().map(String::as_str).collect()
    }

    #[test]
    fn payload_fields_keep_written_order() {
        let engine = engine();

        let check = payload(&call_tool(
            &engine,
            "check_school_vacation",
            &json!({"date": "31/12/2019", "region": "flanders"}),
        ));
        assert_eq!(keys(&check), ["date", "region", "isSchoolVacation", "message"]);

        let periods = payload(&call_tool(&engine, "get_vacation_periods", &json!({"region": "flanders"})));
        assert_eq!(keys(&periods), ["region", "year", "vacationPeriods", "totalPeriods"]);
        assert_eq!(keys(&periods["vacationPeriods"][0]), ["start", "end"]);

        let regions = payload(&call_tool(&engine, "get_supported_regions", &json!({})));
        assert_eq!(keys(&regions), ["supportedRegions", "description"]);
    }

    #[test]
    fn vacation_periods_with_and_without_year() {
        let engine = engine();

        let all = payload(&call_tool(&engine, "get_vacation_periods", &json!({"region": "flanders"})));
        assert_eq!(all["year"], "all years");
        assert_eq!(all["totalPeriods"], 1);
        assert_eq!(
            all["vacationPeriods"],
            json!([{"start": "31/12/2019", "end": "01/01/2020"}])
        );

        let y2020 = payload(&call_tool(
            &engine,
            "get_vacation_periods",
            &json!({"region": "flanders", "year": 2020}),
        ));
        assert_eq!(y2020["year"], 2020);
        assert_eq!(
            y2020["vacationPeriods"],
            json!([{"start": "01/01/2020", "end": "01/01/2020"}])
        );
    }

    #[test]
    fn accepts_whole_float_year() {
        let result = call_tool(
            &engine(),
            "get_vacation_periods",
            &json!({"region": "flanders", "year": 2019.0}),
        );
        assert!(!result.is_error);
        assert_eq!(payload(&result)["totalPeriods"], 1);
    }

    #[test]
    fn rejects_non_integer_year() {
        for year in [json!("2019"), json!(2019.5)] {
            let result = call_tool(
                &engine(),
                "get_vacation_periods",
                &json!({"region": "flanders", "year": year}),
            );
            assert!(result.is_error);
            assert!(payload(&result)["error"].as_str().unwrap().contains("year"));
        }
    }

    #[test]
    fn supported_regions_payload() {
        let body = payload(&call_tool(&engine(), "get_supported_regions", &Value::Null));
        assert_eq!(body["supportedRegions"].as_array().unwrap().len(), 6);
        assert_eq!(body["supportedRegions"][2], "north-netherlands");
        assert_eq!(body["description"], SUPPORTED_REGIONS_DESCRIPTION);
    }

    #[test]
    fn unknown_region_is_a_tool_error() {
        let args = json!({"date": "31/12/2019", "region": "atlantis"});
        let result = call_tool(&engine(), "check_school_vacation", &args);
        assert!(result.is_error);

        let body = payload(&result);
        assert_eq!(body["error"], "Unknown region: atlantis");
        assert_eq!(body["tool"], "check_school_vacation");
        assert_eq!(body["arguments"], args);
    }

    #[test]
    fn missing_parameter_is_a_tool_error() {
        let result = call_tool(&engine(), "check_school_vacation", &json!({"region": "flanders"}));
        assert!(result.is_error);
        assert_eq!(payload(&result)["error"], "Missing required parameter: date");
    }

    #[test]
    fn unknown_tool_is_a_tool_error() {
        let result = call_tool(&engine(), "delete_calendar", &json!({}));
        assert!(result.is_error);
        assert_eq!(payload(&result)["error"], "Unknown tool: delete_calendar");
    }

    #[test]
    fn tool_call_result_serialises_is_error_only_when_set() {
        let ok = serde_json::to_value(ToolCallResult::text("hi")).unwrap();
        assert!(ok.get("isError").is_none());
        assert_eq!(ok["content"][0]["type"], "text");

        let err = serde_json::to_value(ToolCallResult::error("boom")).unwrap();
        assert_eq!(err["isError"], true);
    }
}
