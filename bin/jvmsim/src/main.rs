use jvmsim::jvm::code::{parse_listing, render_instruction, Method};
use jvmsim::jvm::{Name, RenderDescriptor};
use jvmsim::simulator::{
    simulate, BlockId, BlockTree, Frame, Settings, Simulation, Slot, UnsupportedPolicy, Value,
    ValueArena,
};
use jvmsim::*;

use clap::{value_parser, Arg, ArgAction, Command};
use std::fs;

fn main() -> Result<(), simulator::Error> {
    env_logger::init();

    let matches = Command::new("JVM method simulator")
        .version("0.1.0")
        .about("Abstractly interpret the methods in a listing and print the frames at every instruction")
        .arg(
            Arg::new("max-iterations")
                .long("max-iterations")
                .value_name("N")
                .value_parser(value_parser!(usize))
                .help("Give up (and report the simulation as incomplete) after this many steps"),
        )
        .arg(
            Arg::new("strict")
                .long("strict")
                .action(ArgAction::SetTrue)
                .help("Fail on unsupported operations instead of treating their results as unknown"),
        )
        .arg(
            Arg::new("no-symbolic")
                .long("no-symbolic")
                .action(ArgAction::SetTrue)
                .help("Don't symbolically execute well-known library methods"),
        )
        .arg(
            Arg::new("no-handlers")
                .long("no-handlers")
                .action(ArgAction::SetTrue)
                .help("Ignore exception handlers"),
        )
        .arg(
            Arg::new("INPUT")
                .help("Sets the input listing file to use")
                .required(true)
                .index(1),
        )
        .get_matches();

    let mut settings = Settings::new();
    settings.max_iterations = matches.get_one::<usize>("max-iterations").copied();
    if matches.get_flag("strict") {
        settings.unsupported_policy = UnsupportedPolicy::Fail;
    }
    settings.simulate_pure_calls = !matches.get_flag("no-symbolic");
    settings.follow_exception_handlers = !matches.get_flag("no-handlers");

    let input = matches
        .get_one::<String>("INPUT")
        .ok_or_else(|| simulator::Error::InvalidMethod(String::from("Missing input")))?;
    log::info!("Reading and simulating '{}'", input);
    let listing = fs::read_to_string(input).map_err(jvm::Error::IoError)?;
    let methods = parse_listing(&listing)?;

    for method in &methods {
        log::info!(
            "Simulating {}.{}{}",
            method.owner.as_str(),
            method.name.as_str(),
            method.descriptor.render()
        );
        let simulation = simulate(method, &settings)?;
        print_simulation(method, &simulation);
    }

    Ok(())
}

fn print_simulation(method: &Method, simulation: &Simulation) {
    println!(
        "{}.{}{}",
        method.owner.as_str(),
        method.name.as_str(),
        method.descriptor.render()
    );
    for (index, insn) in method.code.iter() {
        let frame = match simulation.frame_before(index) {
            Some(frame) => render_frame(frame, &simulation.values),
            None => String::from("unreachable"),
        };
        println!("  {:>4}: {:<40} {}", index, render_instruction(insn), frame);
    }

    println!("  blocks:");
    print_block(simulation, BlockTree::ROOT, 2);

    let hint = |declared: Option<u16>| declared.map_or(String::from("?"), |n| n.to_string());
    println!(
        "  {:?} after {} steps, max stack {} (declared {}), max locals {} (declared {})",
        simulation.completion,
        simulation.iterations,
        simulation.max_stack,
        hint(method.max_stack),
        simulation.max_locals,
        hint(method.max_locals),
    );
    println!();
}

fn print_block(simulation: &Simulation, id: BlockId, depth: usize) {
    let block = simulation.blocks.get(id);
    println!(
        "{:indent$}[{}, {}]",
        "",
        block.start,
        block.end,
        indent = depth * 2
    );
    for child in &block.children {
        print_block(simulation, *child, depth + 1);
    }
}

fn render_frame(frame: &Frame, values: &ValueArena) -> String {
    let render = |slots: &[Slot]| {
        slots
            .iter()
            .filter_map(|slot| match slot {
                Slot::Value(id) => match values.value(*id) {
                    Value::Uninitialized => Some(String::from("-")),
                    value => Some(value.to_string()),
                },
                Slot::Continuation => None,
            })
            .collect::<Vec<_>>()
            .join(", ")
    };
    format!("locals [{}] stack [{}]", render(&frame.locals), render(&frame.stack))
}
