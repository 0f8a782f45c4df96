/// A structured todo item reported by a progress-tracking tool.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub content: String,
    /// One of: "pending", "in_progress", "completed", "cancelled"
    pub status: String,
}

/// Events emitted by tools to communicate state changes back to the agent
/// loop.  The loop translates these into response items for the caller.
#[derive(Debug, Clone)]
pub enum ToolEvent {
    TodoUpdate(Vec<TodoItem>),
}
