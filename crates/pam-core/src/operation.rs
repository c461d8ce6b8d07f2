//! Operations the server can forward to the review agent.

use serde::{Deserialize, Serialize};

use crate::error::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Review,
    Describe,
    FindBugs,
    Improve,
    Ask,
    Reflect,
    Analyze,
    Explain,
}

impl Operation {
    pub const ALL: [Operation; 8] = [
        Operation::Review,
        Operation::Describe,
        Operation::FindBugs,
        Operation::Improve,
        Operation::Ask,
        Operation::Reflect,
        Operation::Analyze,
        Operation::Explain,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Review => "review",
            Operation::Describe => "describe",
            Operation::FindBugs => "find_bugs",
            Operation::Improve => "improve",
            Operation::Ask => "ask",
            Operation::Reflect => "reflect",
            Operation::Analyze => "analyze",
            Operation::Explain => "explain",
        }
    }

    /// Agent command word. Bug scans reuse the generic review command.
    pub fn command(&self) -> &'static str {
        match self {
            Operation::Review | Operation::FindBugs => "/review",
            Operation::Describe => "/describe",
            Operation::Improve => "/improve",
            Operation::Ask => "/ask",
            Operation::Reflect => "/reflect",
            Operation::Analyze => "/analyze",
            Operation::Explain => "/explain",
        }
    }

    /// Message sent to the client before the agent is invoked.
    pub fn start_message(&self, url: &str) -> String {
        match self {
            Operation::Review => format!("Reviewing PR: {}", url),
            Operation::Describe => format!("Generating description for PR: {}", url),
            Operation::FindBugs => format!("Scanning PR for bugs: {}", url),
            Operation::Improve => format!("Suggesting improvements for PR: {}", url),
            Operation::Ask => format!("Answering question about PR: {}", url),
            Operation::Reflect => format!("Reflecting on PR: {}", url),
            Operation::Analyze => format!("Analyzing PR: {}", url),
            Operation::Explain => format!("Explaining PR: {}", url),
        }
    }

    /// Returned when the agent completes without producing any text.
    pub fn empty_result_message(&self) -> &'static str {
        match self {
            Operation::Review => "Review completed, but no results were returned.",
            Operation::Describe => "Description generated, but no results were returned.",
            Operation::FindBugs => "Bug scan completed, but no results were returned.",
            Operation::Improve => "Improvements suggested, but no results were returned.",
            Operation::Ask => "Question answered, but no results were returned.",
            Operation::Reflect => "Reflection completed, but no results were returned.",
            Operation::Analyze => "Analysis completed, but no results were returned.",
            Operation::Explain => "Explanation completed, but no results were returned.",
        }
    }

    pub fn error_prefix(&self) -> &'static str {
        match self {
            Operation::Review => "Error reviewing PR",
            Operation::Describe => "Error describing PR",
            Operation::FindBugs => "Error scanning PR for bugs",
            Operation::Improve => "Error improving PR",
            Operation::Ask => "Error answering question",
            Operation::Reflect => "Error reflecting on PR",
            Operation::Analyze => "Error analyzing PR",
            Operation::Explain => "Error explaining PR",
        }
    }

    pub fn error_message(&self, error: &Error) -> String {
        format!("{}: {}", self.error_prefix(), error.detail())
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "review" => Ok(Operation::Review),
            "describe" => Ok(Operation::Describe),
            "find_bugs" | "bugs" => Ok(Operation::FindBugs),
            "improve" => Ok(Operation::Improve),
            "ask" => Ok(Operation::Ask),
            "reflect" => Ok(Operation::Reflect),
            "analyze" => Ok(Operation::Analyze),
            "explain" => Ok(Operation::Explain),
            other => Err(Error::invalid_request(format!(
                "unknown operation '{}'",
                other
            ))),
        }
    }
}

/// A single request to run an operation against a pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    url: String,
    operation: Operation,
    extra_args: Option<String>,
}

impl OperationRequest {
    pub fn new(url: impl Into<String>, operation: Operation) -> Result<Self, Error> {
        let url = url.into().trim().to_string();
        if url.is_empty() {
            return Err(Error::invalid_request("PR URL must not be empty"));
        }
        if operation == Operation::Ask {
            return Err(Error::invalid_request("ask requires a question"));
        }
        Ok(Self {
            url,
            operation,
            extra_args: None,
        })
    }

    pub fn ask(url: impl Into<String>, question: impl Into<String>) -> Result<Self, Error> {
        let url = url.into().trim().to_string();
        let question = question.into().trim().to_string();
        if url.is_empty() {
            return Err(Error::invalid_request("PR URL must not be empty"));
        }
        if question.is_empty() {
            return Err(Error::invalid_request("question must not be empty"));
        }
        Ok(Self {
            url,
            operation: Operation::Ask,
            extra_args: Some(question),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Full agent command line, e.g. `/review` or `/ask What changed?`.
    pub fn command(&self) -> String {
        match &self.extra_args {
            Some(extra) => format!("{} {}", self.operation.command(), extra),
            None => self.operation.command().to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands() {
        assert_eq!(Operation::Review.command(), "/review");
        assert_eq!(Operation::FindBugs.command(), "/review");
        assert_eq!(Operation::Describe.command(), "/describe");
        assert_eq!(Operation::Reflect.command(), "/reflect");
        assert_eq!(Operation::Explain.command(), "/explain");
    }

    #[test]
    fn test_names_round_trip_through_parse() {
        for operation in Operation::ALL {
            assert_eq!(operation.name().parse::<Operation>().unwrap(), operation);
        }
    }

    #[test]
    fn test_parse_operation() {
        assert_eq!("review".parse::<Operation>().unwrap(), Operation::Review);
        assert_eq!("find-bugs".parse::<Operation>().unwrap(), Operation::FindBugs);
        assert_eq!("Find_Bugs".parse::<Operation>().unwrap(), Operation::FindBugs);
        assert!("deploy".parse::<Operation>().is_err());
    }

    #[test]
    fn test_request_rejects_empty_url() {
        assert!(OperationRequest::new("", Operation::Review).is_err());
        assert!(OperationRequest::new("   ", Operation::Describe).is_err());
    }

    #[test]
    fn test_ask_request() {
        let request =
            OperationRequest::ask("https://github.com/org/repo/pull/1", "Why the new lock?")
                .unwrap();
        assert_eq!(request.operation(), Operation::Ask);
        assert_eq!(request.command(), "/ask Why the new lock?");

        assert!(OperationRequest::ask("https://github.com/org/repo/pull/1", " ").is_err());
        assert!(OperationRequest::new("https://github.com/org/repo/pull/1", Operation::Ask)
            .is_err());
    }

    #[test]
    fn test_error_message() {
        let err = Error::agent("upstream 502");
        assert_eq!(
            Operation::FindBugs.error_message(&err),
            "Error scanning PR for bugs: upstream 502"
        );
    }
}
