// src/api/schema.rs

//! Field schema for the service-creation form, served on
//! `OPTIONS /api/services/schema`.

use serde_json::{json, Value};

pub fn service_schema() -> Value {
    json!({
        "fields": [
            { "name": "name", "type": "string", "required": true },
            { "name": "description", "type": "string", "required": false },
            { "name": "execCommand", "type": "string", "required": true },
            { "name": "preExecCommand", "type": "string", "required": false },
            { "name": "postExecCommand", "type": "string", "required": false },
            { "name": "workingDir", "type": "string", "required": false },
            { "name": "user", "type": "string", "required": false },
            { "name": "group", "type": "string", "required": false },
            {
                "name": "env",
                "type": "list",
                "required": false,
                "item": { "key": "string", "value": "string", "secret": "bool" }
            },
            { "name": "autoStart", "type": "bool", "required": false, "default": false },
            {
                "name": "stopSignal",
                "type": "select",
                "required": false,
                "options": ["TERM", "INT", "KILL"],
                "default": "TERM"
            },
            {
                "name": "validExitCodes",
                "type": "intList",
                "required": false,
                "default": [0]
            },
            {
                "name": "restartPolicy",
                "type": "select",
                "required": false,
                "options": ["none", "on-failure", "always"],
                "default": "none"
            },
            { "name": "timeoutSeconds", "type": "int", "required": false },
            { "name": "enabled", "type": "bool", "required": false, "default": true },
            { "name": "retries", "type": "int", "required": false, "default": 3 }
        ]
    })
}
