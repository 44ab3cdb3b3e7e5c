/*
 * Copyright (c) 2026 Jonathan Perkin <jonathan@perkin.org.uk>
 *
 * Permission to use, copy, modify, and distribute this software for any
 * purpose with or without fee is hereby granted, provided that the above
 * copyright notice and this permission notice appear in all copies.
 *
 * THE SOFTWARE IS PROVIDED "AS IS" AND THE AUTHOR DISCLAIMS ALL WARRANTIES
 * WITH REGARD TO THIS SOFTWARE INCLUDING ALL IMPLIED WARRANTIES OF
 * MERCHANTABILITY AND FITNESS. IN NO EVENT SHALL THE AUTHOR BE LIABLE FOR
 * ANY SPECIAL, DIRECT, INDIRECT, OR CONSEQUENTIAL DAMAGES OR ANY DAMAGES
 * WHATSOEVER RESULTING FROM LOSS OF USE, DATA OR PROFITS, WHETHER IN AN
 * ACTION OF CONTRACT, NEGLIGENCE OR OTHER TORTIOUS ACTION, ARISING OUT OF
 * OR IN CONNECTION WITH THE USE OR PERFORMANCE OF THIS SOFTWARE.
 */

/*!
 * JSON schemas for manifest records and depositing agents.
 *
 * Both schemas are compiled once on first use.  Violations are collected in
 * full rather than stopping at the first one, and are reported as
 * [`Error::Schema`] with one `"<instance path>: <message>"` string each.
 */

use jsonschema::Validator;
use serde_json::Value;
use std::sync::OnceLock;

use crate::error::{Error, Result};

/**
 * Schema identifier stored in the `$schema` field of every manifest record.
 */
pub const BAGIT_SCHEMA_ID: &str =
    "https://sipstore.readthedocs.io/schemas/sipstore/bagit-v1.0.0.json";

/**
 * Schema identifier for depositing agents.
 */
pub const AGENT_SCHEMA_ID: &str =
    "https://sipstore.readthedocs.io/schemas/sipstore/agent-v1.0.0.json";

const BAGIT_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "title": "Package manifest record",
  "type": "object",
  "required": ["files"],
  "properties": {
    "$schema": { "type": "string" },
    "files": {
      "type": "array",
      "items": { "$ref": "#/definitions/file" }
    }
  },
  "definitions": {
    "file": {
      "type": "object",
      "required": ["filename", "path", "size", "checksum"],
      "properties": {
        "filename": { "type": "string", "minLength": 1 },
        "path": { "type": "string" },
        "size": { "type": "integer", "minimum": 0 },
        "checksum": { "type": "string", "pattern": "^[a-z0-9]+:[0-9a-f]+$" },
        "filepath": { "type": "string" },
        "file_uuid": { "type": "string" },
        "metadata_id": { "type": "string" },
        "content": { "type": "string" },
        "fetched": { "type": "boolean" }
      },
      "anyOf": [
        { "required": ["file_uuid"] },
        { "required": ["metadata_id"] },
        { "required": ["content"] }
      ],
      "dependencies": {
        "filepath": ["file_uuid"]
      },
      "if": {
        "properties": { "fetched": { "const": true } },
        "required": ["fetched"]
      },
      "then": { "required": ["file_uuid"] }
    }
  }
}"##;

const AGENT_SCHEMA: &str = r##"{
  "$schema": "http://json-schema.org/draft-07/schema#",
  "title": "Depositing agent",
  "type": "object",
  "properties": {
    "$schema": { "type": "string" },
    "email": { "type": "string" },
    "ip_address": { "type": "string" }
  }
}"##;

type Compiled = std::result::Result<Validator, String>;

static BAGIT_VALIDATOR: OnceLock<Compiled> = OnceLock::new();
static AGENT_VALIDATOR: OnceLock<Compiled> = OnceLock::new();

fn compile(source: &str) -> Compiled {
    let schema: Value =
        serde_json::from_str(source).map_err(|e| e.to_string())?;
    jsonschema::draft7::new(&schema).map_err(|e| e.to_string())
}

fn validate(
    cell: &OnceLock<Compiled>,
    source: &str,
    instance: &Value,
) -> Result<()> {
    let validator = cell
        .get_or_init(|| compile(source))
        .as_ref()
        .map_err(|e| Error::Schema(vec![format!("invalid schema: {e}")]))?;
    let violations: Vec<String> = validator
        .iter_errors(instance)
        .map(|e| format!("{}: {}", e.instance_path, e))
        .collect();
    if violations.is_empty() {
        Ok(())
    } else {
        Err(Error::Schema(violations))
    }
}

/**
 * Validate a serialized manifest record.
 */
pub fn validate_manifest_record(instance: &Value) -> Result<()> {
    validate(&BAGIT_VALIDATOR, BAGIT_SCHEMA, instance)
}

/**
 * Validate a depositing agent.
 */
pub fn validate_agent(instance: &Value) -> Result<()> {
    validate(&AGENT_VALIDATOR, AGENT_SCHEMA, instance)
}
