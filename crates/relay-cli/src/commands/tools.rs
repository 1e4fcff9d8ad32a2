use relay_core::Config;
use relay_tools::{CommandSession, ToolDescriptor, ToolRegistry};
use std::sync::Arc;

pub fn run(config: &Config) -> anyhow::Result<()> {
    let session = Arc::new(CommandSession::from_process(config.execution_limits())?);
    let tools = super::build_registry(session, config.web_tools)?;
    print_tool_list(&tools);
    Ok(())
}

fn print_tool_list(tools: &ToolRegistry) {
    println!("Available tools ({}):", tools.len());
    for descriptor in tools.iter() {
        println!("{}", format_tool_line(descriptor));
    }
}

fn format_tool_line(descriptor: &ToolDescriptor) -> String {
    format!(
        "{} [{}] - {}",
        descriptor.name(),
        descriptor.capability().tag(),
        descriptor.description()
    )
}
