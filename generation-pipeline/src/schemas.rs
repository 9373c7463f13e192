use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

// Per-kind payload types. These are the canonical artifact shapes; the JSON
// schemas below mirror them for the structured-output request, and the
// validators enforce what a schema alone cannot (counts, references, cycles).

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LessonSection {
    pub title: String,
    pub content: String,
    pub key_points: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LessonPayload {
    pub topic: String,
    pub sections: Vec<LessonSection>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Flashcard {
    pub front: String,
    pub back: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FlashcardsPayload {
    pub topic: String,
    pub cards: Vec<Flashcard>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub correct_answer_index: usize,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QuizPayload {
    pub title: String,
    pub questions: Vec<QuizQuestion>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MindmapNodeType {
    Input,
    Default,
    Output,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MindmapNode {
    pub id: String,
    pub label: String,
    #[serde(rename = "type")]
    pub node_type: MindmapNodeType,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MindmapEdge {
    pub source: String,
    pub target: String,
    pub label: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MindmapPayload {
    pub nodes: Vec<MindmapNode>,
    pub edges: Vec<MindmapEdge>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScriptTurn {
    pub speaker: String,
    pub voice: String,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodcastScriptPayload {
    pub topic: String,
    pub script: Vec<ScriptTurn>,
}

// JSON schemas (OpenAI structured-output strict mode)

pub fn lesson_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "topic": { "type": "string" },
            "sections": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "title": { "type": "string" },
                        "content": { "type": "string" },
                        "key_points": { "type": "array", "items": { "type": "string" } }
                    },
                    "required": ["title", "content", "key_points"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["topic", "sections"],
        "additionalProperties": false
    })
}

pub fn flashcards_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "topic": { "type": "string" },
            "cards": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "front": { "type": "string" },
                        "back": { "type": "string" }
                    },
                    "required": ["front", "back"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["topic", "cards"],
        "additionalProperties": false
    })
}

pub fn quiz_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "title": { "type": "string" },
            "questions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "question": { "type": "string" },
                        "options": { "type": "array", "items": { "type": "string" } },
                        "correct_answer_index": { "type": "integer" },
                        "explanation": { "type": "string" }
                    },
                    "required": ["question", "options", "correct_answer_index", "explanation"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["title", "questions"],
        "additionalProperties": false
    })
}

pub fn mindmap_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "nodes": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string" },
                        "label": { "type": "string" },
                        "type": { "type": "string", "enum": ["input", "default", "output"] }
                    },
                    "required": ["id", "label", "type"],
                    "additionalProperties": false
                }
            },
            "edges": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "source": { "type": "string" },
                        "target": { "type": "string" },
                        "label": { "type": "string" }
                    },
                    "required": ["source", "target", "label"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["nodes", "edges"],
        "additionalProperties": false
    })
}

pub fn podcast_script_schema() -> Value {
    json!({
        "type": "object",
        "properties": {
            "topic": { "type": "string" },
            "script": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "speaker": { "type": "string" },
                        "voice": { "type": "string" },
                        "text": { "type": "string" }
                    },
                    "required": ["speaker", "voice", "text"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["topic", "script"],
        "additionalProperties": false
    })
}

// Semantic validation beyond the schema

pub fn validate_lesson(payload: &LessonPayload) -> Result<(), String> {
    if payload.sections.is_empty() {
        return Err("lesson has no sections".into());
    }
    Ok(())
}

pub fn validate_flashcards(payload: &FlashcardsPayload) -> Result<(), String> {
    if payload.cards.is_empty() {
        return Err("flashcard set is empty".into());
    }
    Ok(())
}

pub fn validate_quiz(payload: &QuizPayload) -> Result<(), String> {
    if payload.questions.is_empty() {
        return Err("quiz has no questions".into());
    }
    for (i, question) in payload.questions.iter().enumerate() {
        if question.options.len() != 4 {
            return Err(format!(
                "question {} has {} options, expected exactly 4",
                i,
                question.options.len()
            ));
        }
        if question.correct_answer_index > 3 {
            return Err(format!(
                "question {} has correct_answer_index {} outside 0-3",
                i, question.correct_answer_index
            ));
        }
    }
    Ok(())
}

pub fn validate_mindmap(payload: &MindmapPayload) -> Result<(), String> {
    if payload.nodes.is_empty() {
        return Err("mindmap has no nodes".into());
    }

    let mut ids = HashSet::new();
    for node in &payload.nodes {
        if !ids.insert(node.id.as_str()) {
            return Err(format!("duplicate node id '{}'", node.id));
        }
    }

    for edge in &payload.edges {
        if !ids.contains(edge.source.as_str()) {
            return Err(format!("edge source '{}' is not a node", edge.source));
        }
        if !ids.contains(edge.target.as_str()) {
            return Err(format!("edge target '{}' is not a node", edge.target));
        }
    }

    if has_cycle(payload) {
        return Err("mindmap contains a cycle".into());
    }

    Ok(())
}

/// `allowed_voices` carries the assigned voice ids; every turn must use one
/// of them, and a duo script needs at least two distinct speakers.
pub fn validate_podcast_script(
    payload: &PodcastScriptPayload,
    duo: bool,
    allowed_voices: &[&str],
) -> Result<(), String> {
    if payload.script.is_empty() {
        return Err("script has no turns".into());
    }

    let speakers: HashSet<&str> = payload
        .script
        .iter()
        .map(|turn| turn.speaker.as_str())
        .collect();
    if duo && speakers.len() < 2 {
        return Err("duo script needs at least 2 distinct speakers".into());
    }

    for (i, turn) in payload.script.iter().enumerate() {
        if !allowed_voices.contains(&turn.voice.as_str()) {
            return Err(format!(
                "turn {} uses voice '{}' outside the assigned set",
                i, turn.voice
            ));
        }
        if turn.text.trim().is_empty() {
            return Err(format!("turn {i} has empty text"));
        }
    }

    Ok(())
}

/// Kahn's algorithm: the graph is acyclic iff every node can be peeled off.
fn has_cycle(payload: &MindmapPayload) -> bool {
    let mut indegree: HashMap<&str, usize> =
        payload.nodes.iter().map(|n| (n.id.as_str(), 0)).collect();
    let mut adjacency: HashMap<&str, Vec<&str>> = HashMap::new();

    for edge in &payload.edges {
        adjacency
            .entry(edge.source.as_str())
            .or_default()
            .push(edge.target.as_str());
        if let Some(count) = indegree.get_mut(edge.target.as_str()) {
            *count += 1;
        }
    }

    let mut queue: Vec<&str> = indegree
        .iter()
        .filter(|(_, count)| **count == 0)
        .map(|(id, _)| *id)
        .collect();
    let mut visited = 0;

    while let Some(node) = queue.pop() {
        visited += 1;
        for next in adjacency.get(node).into_iter().flatten() {
            if let Some(count) = indegree.get_mut(next) {
                *count -= 1;
                if *count == 0 {
                    queue.push(next);
                }
            }
        }
    }

    visited != payload.nodes.len()
}
