use crate::models::{DeviceAlarmGroup, OutboundMessage, LATCH_FORMAT};

/// Characters MarkdownV2 treats as markup.
const MARKDOWN_SPECIAL: [char; 18] = [
    '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// Prefixes every MarkdownV2 markup character with a backslash.
pub fn escape_markdown(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        if MARKDOWN_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Renders all groups bound for one recipient into a single message.
pub fn notification_message(groups: &[DeviceAlarmGroup]) -> OutboundMessage {
    let text = groups
        .iter()
        .map(render_group)
        .collect::<Vec<_>>()
        .join("\n\n");

    OutboundMessage::markdown(text)
}

fn render_group(group: &DeviceAlarmGroup) -> String {
    let device = &group.device;
    let header = format!(
        "Device *{}* on object *{}* at *{}* reported:",
        escape_markdown(&device.name),
        escape_markdown(&device.object_name),
        escape_markdown(&device.object_address),
    );

    let blocks = group
        .events
        .iter()
        .map(|event| {
            format!(
                "{}\n{}",
                escape_markdown(&event.latch_message),
                escape_markdown(&event.latch_dt.format(LATCH_FORMAT).to_string()),
            )
        })
        .collect::<Vec<_>>()
        .join("\n\n");

    format!("{}\n\n{}", header, blocks)
}
