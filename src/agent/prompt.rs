//! Default prompt framing for ask, plan and execute invocations

const READ_ONLY_PREFIX: &str = "Do NOT create, modify, or delete any files. \
Only answer questions and ask clarifying questions.\n\n";

/// Prompt for a read-only question
pub fn ask_prompt(message: &str) -> String {
    format!("{READ_ONLY_PREFIX}{message}")
}

/// Prompt asking for an implementation plan
pub fn plan_prompt(objective: &str, constraints: &[String]) -> String {
    let mut parts = vec![
        format!("Create a detailed implementation plan for: {objective}"),
        "Include: Goal, Files to create/modify, Step-by-step implementation, and Commands to run."
            .to_string(),
    ];
    let constraints: Vec<&str> = constraints
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .collect();
    if !constraints.is_empty() {
        parts.push(format!("Constraints: {}", constraints.join(", ")));
    }
    parts.join("\n")
}

/// Prompt handing an approved plan to the agent
pub fn execute_prompt(plan: &str) -> String {
    format!("Implement this plan exactly:\n\n{plan}")
}
