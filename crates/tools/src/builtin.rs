//! Built-in collaborators backed by external programs.
//!
//! A configured program is invoked as `program args... <code>`. It receives a
//! JSON payload on stdin:
//!
//! ```json
//! { "tool": "ToolB", "inputs": { "V2": 10 }, "snapshot": { "V2": 10, "P1": 3 } }
//! ```
//!
//! `inputs` holds the values of the inputs declared in the route's manifest,
//! `snapshot` the newest value of every variable in the data store.
//!
//! A calculator prints a JSON object of output values on stdout. A populator's
//! stdout is ignored.

use super::r#trait::*;
use async_trait::async_trait;
use docflow_core::{Direction, Outputs, RequestId, ToolCode, ToolDescriptor, VariableId};
use docflow_storage::DataStore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, warn};

/// How to invoke one tool or template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandSpec {
    /// Program to run
    pub program: String,

    /// Arguments placed before the tool code
    #[serde(default)]
    pub args: Vec<String>,

    /// Extra environment variables
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Fail before launching when a declared input has no value
    #[serde(default)]
    pub require_inputs: bool,
}

impl CommandSpec {
    /// Create a spec for `program`.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: HashMap::new(),
            require_inputs: false,
        }
    }

    /// Set arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Require every declared input to be present.
    pub fn require_inputs(mut self) -> Self {
        self.require_inputs = true;
        self
    }
}

/// Build the stdin payload for `tool` from the current store contents.
async fn build_payload(
    tool: &ToolDescriptor,
    store: &dyn DataStore,
    strict: bool,
) -> Result<serde_json::Value, CalculationFailure> {
    let snapshot = store
        .snapshot()
        .await
        .map_err(|e| CalculationFailure::Store(e.to_string()))?;

    let mut inputs = Outputs::new();
    for entry in tool.manifest.iter().filter(|e| e.direction == Direction::In) {
        match snapshot.get(&entry.variable) {
            Some(value) => {
                inputs.insert(entry.variable.clone(), value.clone());
            }
            None if strict => return Err(CalculationFailure::MissingInput(entry.variable.clone())),
            None => debug!(tool = %tool.code, variable = %entry.variable, "Input has no value"),
        }
    }

    Ok(serde_json::json!({ "tool": tool.code, "inputs": inputs, "snapshot": snapshot }))
}

/// Run `spec` for `code`, feeding `payload` on stdin, and return stdout.
///
/// Stdin is written while stdout and stderr are drained, so neither side can
/// block on a full pipe.
async fn run_command(
    spec: &CommandSpec,
    code: &ToolCode,
    payload: &serde_json::Value,
) -> Result<Vec<u8>, CalculationFailure> {
    let start = std::time::Instant::now();
    let bytes =
        serde_json::to_vec(payload).map_err(|e| CalculationFailure::InvalidOutput(e.to_string()))?;

    let mut cmd = Command::new(&spec.program);
    cmd.args(&spec.args)
        .arg(code.as_str())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    for (k, v) in &spec.env {
        cmd.env(k, v);
    }

    let mut child = cmd
        .spawn()
        .map_err(|e| CalculationFailure::Launch(format!("{}: {}", spec.program, e)))?;

    let stdin = child.stdin.take();
    let write = async move {
        let Some(mut stdin) = stdin else {
            return Ok(());
        };
        match stdin.write_all(&bytes).await {
            // Programs that never read stdin may already have exited
            Err(e) if e.kind() != std::io::ErrorKind::BrokenPipe => Err(e),
            _ => Ok(()),
        }
    };

    let (written, output) = tokio::join!(write, child.wait_with_output());
    let output = output.map_err(|e| CalculationFailure::Launch(e.to_string()))?;
    written.map_err(|e| CalculationFailure::Launch(e.to_string()))?;

    debug!(tool = %code, elapsed = ?start.elapsed(), status = %output.status, "Command finished");

    if !output.status.success() {
        return Err(CalculationFailure::NonZeroExit {
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(output.stdout)
}

/// Calculator that runs one configured program per tool code.
#[derive(Debug, Clone, Default)]
pub struct CommandCalculator {
    commands: HashMap<ToolCode, CommandSpec>,
}

impl CommandCalculator {
    /// Create a calculator from a code → command map.
    pub fn new(commands: HashMap<ToolCode, CommandSpec>) -> Self {
        Self { commands }
    }

    /// Register a command.
    pub fn with_command(mut self, code: impl Into<ToolCode>, spec: CommandSpec) -> Self {
        self.commands.insert(code.into(), spec);
        self
    }
}

#[async_trait]
impl Calculator for CommandCalculator {
    async fn calculate(
        &self,
        tool: &ToolDescriptor,
        store: &dyn DataStore,
    ) -> Result<Outputs, CalculationFailure> {
        let spec = self
            .commands
            .get(&tool.code)
            .ok_or_else(|| CalculationFailure::NotConfigured(tool.code.clone()))?;

        let payload = build_payload(tool, store, spec.require_inputs).await?;
        let stdout = run_command(spec, &tool.code, &payload).await?;

        let outputs: Outputs = serde_json::from_slice(&stdout)
            .map_err(|e| CalculationFailure::InvalidOutput(e.to_string()))?;

        let declared: Vec<&VariableId> = tool.outputs().collect();
        for variable in outputs.keys() {
            if !declared.contains(&variable) {
                warn!(tool = %tool.code, variable = %variable, "Undeclared output");
            }
        }

        Ok(outputs)
    }
}

/// Populator that runs one configured program per template code.
#[derive(Debug, Clone, Default)]
pub struct CommandPopulator {
    commands: HashMap<ToolCode, CommandSpec>,
}

impl CommandPopulator {
    /// Create a populator from a code → command map.
    pub fn new(commands: HashMap<ToolCode, CommandSpec>) -> Self {
        Self { commands }
    }
}

#[async_trait]
impl DocumentPopulator for CommandPopulator {
    async fn populate(
        &self,
        template: &ToolDescriptor,
        store: &dyn DataStore,
    ) -> Result<(), CalculationFailure> {
        let spec = self
            .commands
            .get(&template.code)
            .ok_or_else(|| CalculationFailure::NotConfigured(template.code.clone()))?;

        let payload = build_payload(template, store, spec.require_inputs).await?;
        run_command(spec, &template.code, &payload).await?;
        Ok(())
    }
}

/// Preparation stage serving fixed values.
#[derive(Debug, Clone, Default)]
pub struct StaticPrep {
    values: HashMap<VariableId, serde_json::Value>,
}

impl StaticPrep {
    /// Create from a value map.
    pub fn new(values: HashMap<VariableId, serde_json::Value>) -> Self {
        Self { values }
    }
}

#[async_trait]
impl PrepProvider for StaticPrep {
    async fn prepare(
        &self,
        request: RequestId,
        variables: &[VariableId],
    ) -> Result<Outputs, anyhow::Error> {
        let mut outputs = Outputs::new();
        let mut missing = Vec::new();

        for id in variables {
            match self.values.get(id) {
                Some(value) => {
                    outputs.insert(id.clone(), value.clone());
                }
                None => missing.push(id.to_string()),
            }
        }

        if !missing.is_empty() {
            anyhow::bail!("request {}: no preparation value for {}", request, missing.join(", "));
        }
        Ok(outputs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docflow_core::{ReservedTag, VariableSource};
    use docflow_storage::MemoryDataStore;
    use serde_json::json;

    fn sh(script: &str) -> CommandSpec {
        CommandSpec::new("sh").args(["-c", script])
    }

    async fn store_with(pairs: &[(&str, serde_json::Value)]) -> MemoryDataStore {
        let mut store = MemoryDataStore::new();
        let outputs: Outputs = pairs
            .iter()
            .map(|(k, v)| (VariableId::new(*k), v.clone()))
            .collect();
        store
            .merge(&outputs, &VariableSource::Reserved(ReservedTag::Init), chrono::Utc::now())
            .await
            .unwrap();
        store
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_calculator_parses_outputs() {
        let tool = ToolDescriptor::tool("ToolB").with_input("V2", 0).with_output("V1", 0);
        let calc = CommandCalculator::default()
            .with_command("ToolB", sh(r#"cat > /dev/null; echo '{"V1": 42}'"#));
        let store = store_with(&[("V2", json!(1))]).await;

        let outputs = calc.calculate(&tool, &store).await.unwrap();
        assert_eq!(outputs[&VariableId::new("V1")], json!(42));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_calculator_receives_inputs() {
        // Echo the payload back as the output object
        let tool = ToolDescriptor::tool("Echo").with_input("V2", 0);
        let calc = CommandCalculator::default().with_command(
            "Echo",
            sh(r#"read line; printf '{"payload": %s, "code": "%s"}' "$line" "$0""#),
        );
        let store = store_with(&[("V2", json!("abc")), ("Other", json!(true))]).await;

        let outputs = calc.calculate(&tool, &store).await.unwrap();
        let payload = &outputs[&VariableId::new("payload")];
        assert_eq!(payload["tool"], "Echo");
        assert_eq!(payload["inputs"], json!({ "V2": "abc" }));
        assert_eq!(payload["snapshot"], json!({ "V2": "abc", "Other": true }));
        assert_eq!(outputs[&VariableId::new("code")], json!("Echo"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_failure_kinds() {
        let tool = ToolDescriptor::tool("T");
        let store = MemoryDataStore::new();

        let failing = CommandCalculator::default().with_command("T", sh("echo boom >&2; exit 3"));
        assert_eq!(
            failing.calculate(&tool, &store).await.unwrap_err(),
            CalculationFailure::NonZeroExit { code: 3, stderr: "boom".to_string() }
        );

        let garbage = CommandCalculator::default().with_command("T", sh("echo not-json"));
        assert!(matches!(
            garbage.calculate(&tool, &store).await,
            Err(CalculationFailure::InvalidOutput(_))
        ));

        let missing = CommandCalculator::default()
            .with_command("T", CommandSpec::new("/definitely/not/a/program"));
        assert!(matches!(
            missing.calculate(&tool, &store).await,
            Err(CalculationFailure::Launch(_))
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_large_payload_with_chatty_tool() {
        // Writes well past a pipe buffer to stderr and stdout before reading stdin
        let script = r#"head -c 300000 /dev/zero | tr '\0' e >&2
head -c 300000 /dev/zero | tr '\0' ' '
n=$(wc -c)
echo "{\"read\": $n}""#;
        let tool = ToolDescriptor::tool("Big").with_input("Blob", 0);
        let calc = CommandCalculator::default().with_command("Big", sh(script));
        let store = store_with(&[("Blob", json!("x".repeat(500_000)))]).await;

        let outputs = tokio::time::timeout(
            std::time::Duration::from_secs(60),
            calc.calculate(&tool, &store),
        )
        .await
        .expect("command should not deadlock")
        .unwrap();

        let read = outputs[&VariableId::new("read")].as_u64().unwrap();
        assert!(read > 1_000_000);
    }

    #[tokio::test]
    async fn test_unconfigured_tool() {
        let calc = CommandCalculator::default();
        let err = calc
            .calculate(&ToolDescriptor::tool("Nope"), &MemoryDataStore::new())
            .await
            .unwrap_err();
        assert_eq!(err, CalculationFailure::NotConfigured(ToolCode::new("Nope")));
    }

    #[tokio::test]
    async fn test_required_input_missing() {
        let tool = ToolDescriptor::tool("T").with_input("V9", 0);
        let calc = CommandCalculator::default()
            .with_command("T", CommandSpec::new("true").require_inputs());
        let err = calc.calculate(&tool, &MemoryDataStore::new()).await.unwrap_err();
        assert_eq!(err, CalculationFailure::MissingInput(VariableId::new("V9")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_populator() {
        let template = ToolDescriptor::template("Doc").with_input("V1", 0);
        let mut commands = HashMap::new();
        commands.insert(ToolCode::new("Doc"), sh("cat > /dev/null"));
        let populator = CommandPopulator::new(commands);

        let store = store_with(&[("V1", json!(1))]).await;
        populator.populate(&template, &store).await.unwrap();
    }

    #[tokio::test]
    async fn test_static_prep() {
        let mut values = HashMap::new();
        values.insert(VariableId::new("P1"), json!("prepared"));
        let prep = StaticPrep::new(values);

        let outputs = prep
            .prepare(RequestId::new(), &[VariableId::new("P1")])
            .await
            .unwrap();
        assert_eq!(outputs[&VariableId::new("P1")], json!("prepared"));

        let err = prep
            .prepare(RequestId::new(), &[VariableId::new("P1"), VariableId::new("P2")])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("P2"));
    }
}
