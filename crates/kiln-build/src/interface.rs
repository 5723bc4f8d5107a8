//! Solidity interface rendering from a contract ABI

use semver::Version;
use serde::Deserialize;
use std::fmt::Write;

#[derive(Debug, Deserialize)]
struct AbiItem {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    inputs: Vec<AbiParam>,
    #[serde(default)]
    outputs: Vec<AbiParam>,
    #[serde(default, rename = "stateMutability")]
    state_mutability: Option<String>,
    #[serde(default)]
    anonymous: bool,
}

#[derive(Debug, Deserialize)]
struct AbiParam {
    #[serde(default)]
    name: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default, rename = "internalType")]
    internal_type: Option<String>,
    #[serde(default)]
    indexed: bool,
}

impl AbiParam {
    /// Solidity type name, using the struct name for tuples
    fn type_name(&self) -> String {
        if self.kind.starts_with("tuple") {
            if let Some(internal) = &self.internal_type {
                return internal.trim_start_matches("struct ").to_string();
            }
        }
        self.kind.clone()
    }

    fn is_reference(&self) -> bool {
        self.kind == "string"
            || self.kind == "bytes"
            || self.kind.ends_with(']')
            || self.kind.starts_with("tuple")
    }

    fn render(&self, location: Option<&str>) -> String {
        let mut out = self.type_name();
        if self.indexed {
            out.push_str(" indexed");
        }
        if let Some(location) = location.filter(|_| self.is_reference()) {
            out.push(' ');
            out.push_str(location);
        }
        if !self.name.is_empty() {
            out.push(' ');
            out.push_str(&self.name);
        }
        out
    }
}

fn render_params(params: &[AbiParam], location: Option<&str>) -> String {
    params
        .iter()
        .map(|p| p.render(location))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render `I<name>` for a contract's ABI
///
/// Constructors are dropped. Returns an error when the ABI is not an array of
/// ABI entries.
pub fn render_interface(
    name: &str,
    abi: &serde_json::Value,
    version: &Version,
) -> Result<String, serde_json::Error> {
    let items: Vec<AbiItem> = serde_json::from_value(abi.clone())?;

    let mut events = Vec::new();
    let mut errors = Vec::new();
    let mut functions = Vec::new();
    let mut specials = Vec::new();

    for item in &items {
        match item.kind.as_str() {
            "event" => {
                let anonymous = if item.anonymous { " anonymous" } else { "" };
                events.push(format!(
                    "event {}({}){};",
                    item.name,
                    render_params(&item.inputs, None),
                    anonymous
                ));
            }
            "error" => {
                errors.push(format!(
                    "error {}({});",
                    item.name,
                    render_params(&item.inputs, None)
                ));
            }
            "function" => {
                let mut line = format!(
                    "function {}({}) external",
                    item.name,
                    render_params(&item.inputs, Some("calldata"))
                );
                match item.state_mutability.as_deref() {
                    Some(m @ ("view" | "pure" | "payable")) => {
                        line.push(' ');
                        line.push_str(m);
                    }
                    _ => {}
                }
                if !item.outputs.is_empty() {
                    line.push_str(&format!(
                        " returns ({})",
                        render_params(&item.outputs, Some("memory"))
                    ));
                }
                line.push(';');
                functions.push(line);
            }
            "fallback" => {
                let payable = item.state_mutability.as_deref() == Some("payable");
                specials.push(format!(
                    "fallback() external{};",
                    if payable { " payable" } else { "" }
                ));
            }
            "receive" => specials.push("receive() external payable;".to_string()),
            _ => {}
        }
    }

    let mut out = String::new();
    // Writing to a String cannot fail
    let _ = writeln!(out, "// SPDX-License-Identifier: UNLICENSED");
    let _ = writeln!(out, "pragma solidity ^{};", version);
    let _ = writeln!(out);
    let _ = writeln!(out, "interface I{} {{", name);

    let sections = [events, errors, specials, functions];
    let mut first = true;
    for section in sections.iter().filter(|s| !s.is_empty()) {
        if !first {
            let _ = writeln!(out);
        }
        first = false;
        for line in section {
            let _ = writeln!(out, "    {}", line);
        }
    }

    let _ = writeln!(out, "}}");
    Ok(out)
}
