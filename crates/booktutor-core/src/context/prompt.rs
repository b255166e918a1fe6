//! Prompt text for the tutor and for the summarization pass.
//!
//! The fixed part of every tutor request is the instruction block, the book
//! block and the memory block (long-term notes and the current chapter).

use std::fmt::Write;

use booktutor_types::book::Book;
use booktutor_types::session::{HistoryMessage, HistoryRole, TutorSession};
use booktutor_types::student::Student;
use booktutor_types::summary::SummaryTarget;

/// Instructions that make the model behave as a tutor for one book.
pub fn tutor_instructions(book: &Book, student: &Student) -> String {
    let student_name = &student.name;
    let title = &book.title;
    format!(
        r#"## Role
You are a patient but demanding tutor teaching "{title}" to {student_name}. Be direct and encouraging, and expect {student_name} to keep up.

## Teaching process
1. Chapter intro: look the chapter up with get_chapter_summary and state its objectives in a sentence or two.
2. Explanation: explain one concept at a time in two or three sentences, using what you know about {student_name} from your notes.
3. Check: ask exactly one question after each explanation.
4. Feedback: confirm or correct the answer, briefly.
5. Adjust: move on when the concept is understood, otherwise simplify and revisit it.
6. Wrap up: summarize the chapter and record progress with set_chapter_progress.

## Tools
- get_table_of_contents, get_chapter_summary: the book's structure and chapter content.
- get_student_plan, get_chapter_progress: what {student_name} has covered so far.
- set_current_chapter: move to the chapter you are teaching.
- set_chapter_progress, update_study_plan, update_overall_progress, update_agent_memory: record progress and facts worth remembering.

## Rules
- One concept and one question per reply.
- Never show tool syntax to the student; weave tool results into the conversation.
- If a tool fails, read the error, fix the arguments and try again, or carry on without it.
- Stay on the book; steer back politely when the student drifts."#
    )
}

/// Book metadata block.
pub fn book_block(book: &Book) -> String {
    let mut block = String::from("## Book\n");
    let _ = writeln!(block, "- Title: {}", book.title);
    let _ = writeln!(block, "- Author: {}", book.author);
    if let Some(description) = book.description.as_deref().filter(|d| !d.is_empty()) {
        let _ = writeln!(block, "- Description: {description}");
    }
    if let Some(summary) = book.summary.as_deref().filter(|s| !s.is_empty()) {
        let _ = writeln!(block, "- Summary: {summary}");
    }
    block
}

/// Long-term memory block: the agent's notes and the current chapter.
pub fn memory_block(session: &TutorSession) -> String {
    let mut block = String::from("## Your notes about this student\n");
    if session.notes.trim().is_empty() {
        block.push_str("(none yet)\n");
    } else {
        block.push_str(session.notes.trim());
        block.push('\n');
    }
    match &session.current_chapter {
        Some(chapter) => {
            let _ = writeln!(block, "\nCurrent chapter: {chapter}");
        }
        None => block.push_str("\nNo chapter started yet; begin with the first chapter.\n"),
    }
    block
}

/// The fixed prompt sent with every tutor request.
pub fn tutor_system_prompt(book: &Book, student: &Student, session: &TutorSession) -> String {
    format!(
        "{}\n\n{}\n{}",
        tutor_instructions(book, student),
        book_block(book),
        memory_block(session)
    )
}

/// System prompt of the summarization pass.
pub fn distillation_prompt(book: &Book, student: &Student, session: &TutorSession) -> String {
    format!(
        r#"You maintain the long-term memory of a tutor teaching "{title}" to {name}.
You will receive the part of the conversation that has not been distilled yet.
Consolidate it into durable records by calling the update tools:

- set_chapter_progress: one call per chapter whose status or objectives changed (0 = not started, 1 = in progress, 2 = completed).
- update_overall_progress: a short summary of where {name} stands in the book.
- update_study_plan: the plan for the next sessions.
- update_agent_memory: the complete new notes about {name} (preferences, strengths, recurring mistakes). This replaces the old notes, so keep what is still true.

If one of these needs no change, call skip_update for it with a short reason. Use the read tools to check the current state first.
Do not reply to the student.

{book}
{memory}"#,
        title = book.title,
        name = student.name,
        book = book_block(book),
        memory = memory_block(session),
    )
}

/// The undistilled conversation rendered as a transcript.
pub fn transcript(messages: &[HistoryMessage], student: &Student) -> String {
    let mut text = String::from("## Conversation to distill\n");
    for message in messages {
        let speaker = match message.role {
            HistoryRole::Student => student.name.as_str(),
            HistoryRole::Agent => "Tutor",
        };
        let _ = writeln!(text, "[{}] {speaker}: {}", message.id, message.content);
    }
    text
}

/// Nudge sent when the model stops before settling every target.
pub fn pending_reminder(pending: &[SummaryTarget]) -> String {
    let names: Vec<&str> = pending.iter().map(|t| t.as_str()).collect();
    format!(
        "Still pending: {}. Call the matching update tool for each, or skip_update with a reason.",
        names.join(", ")
    )
}
