//! Prompt construction
//!
//! Prompts are bounded: contexts are truncated to fit `max_chars` and a
//! same-concept question quotes at most `max_evidence` occurrences.

use crate::domain::document::ConceptGroup;
use crate::domain::knowledge::RelationshipType;
use crate::llm::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    pub max_chars: usize,
    pub max_evidence: usize,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_chars: 2000,
            max_evidence: 5,
        }
    }
}

/// System prompt for relationship classification
pub fn relation_system_prompt() -> String {
    let labels: Vec<String> = RelationshipType::all()
        .iter()
        .map(|r| format!("- {}", r.label()))
        .collect();

    format!(
        "你是一位专注于知识图谱分析的AI助手，对Obsidian的链接哲学有深刻理解。你的任务是：\n\
         1. 分析上下文：阅读包含一个链接的文本片段。\n\
         2. 判断关系：从预定义关系列表中选择一个最能描述\"源笔记\"与\"目标笔记\"之间关系的名称。\n\
         3. 严格输出：只回复一个Obsidian wiki链接 `[[关系名称]]`，不要包含任何解释、问候、标点或额外文字。\n\
         \n\
         预定义关系列表：\n{}",
        labels.join("\n")
    )
}

const CONCEPT_SYSTEM_PROMPT: &str =
    "你是一位知识图谱专家，擅长判断不同上下文中的关键词是否指向同一个概念。只回复\"是\"或\"否\"。";

/// Messages asking which relationship links `source` to `target`
pub fn relation_messages(source: &str, target: &str, context: &str, limits: &PromptLimits) -> Vec<Message> {
    let frame = |context: &str| {
        format!(
            "源笔记:《{}》\n目标笔记:《{}》\n上下文:\"...{}...\"\n请判断关系并生成链接。",
            source, target, context
        )
    };

    let overhead = frame("").chars().count();
    let budget = limits.max_chars.saturating_sub(overhead);
    let user = frame(&truncate_content(context, budget));

    vec![Message::system(relation_system_prompt()), Message::user(user)]
}

/// Messages asking whether a group's occurrences name the same concept
pub fn concept_messages(group: &ConceptGroup, limits: &PromptLimits) -> Vec<Message> {
    let header = format!("请判断以下关键词\"{}\"的各次出现是否指向同一个概念：\n", group.key);
    let footer = "\n如果这些关键词确实指向同一个概念，回复\"是\"，否则回复\"否\"。";

    let shown = group.members.iter().take(limits.max_evidence.max(1)).count();
    let fixed = header.chars().count() + footer.chars().count();
    let per_item = limits.max_chars.saturating_sub(fixed) / shown.max(1);

    let evidence: Vec<String> = group
        .members
        .iter()
        .take(shown)
        .map(|member| {
            let file = member
                .source_file
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let frame = |context: &str| {
                format!("关键词: '{}', 上下文: '{}', 文件: {}", member.raw_text, context, file)
            };
            let budget = per_item.saturating_sub(frame("").chars().count() + 1);
            frame(&truncate_content(&member.context, budget))
        })
        .collect();

    let user = format!("{}{}{}", header, evidence.join("\n"), footer);
    vec![Message::system(CONCEPT_SYSTEM_PROMPT), Message::user(user)]
}

/// Truncate to at most `max_chars` characters, marking the cut with "..."
fn truncate_content(content: &str, max_chars: usize) -> String {
    if content.chars().count() <= max_chars {
        return content.to_string();
    }
    if max_chars <= 3 {
        return content.chars().take(max_chars).collect();
    }
    let truncated: String = content.chars().take(max_chars - 3).collect();
    format!("{}...", truncated)
}
