//! DOM Bridge shell
//!
//! Interactive shell over one context, or a script file runner. Every
//! flushed UI command batch is printed. Set `RUST_LOG=info` to see
//! `console.log` output.

use dombridge::ui_command::Operands;
use dombridge::{ContextConfig, ExecutingContext, ScriptValue, UICommand};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use std::process;
use std::time::{Duration, Instant};

fn main() {
    env_logger::init();

    let args: Vec<String> = std::env::args().collect();
    let mut ctx = match new_context() {
        Ok(ctx) => ctx,
        Err(e) => {
            eprintln!("Error creating context: {}", e);
            process::exit(1);
        }
    };

    if args.len() > 1 {
        run_file(&mut ctx, &args[1]);
    } else {
        run_repl(&mut ctx);
    }
}

fn new_context() -> Result<ExecutingContext, dombridge::BridgeError> {
    let mut ctx = ExecutingContext::with_reference_engine(ContextConfig::default())?;
    ctx.set_renderer(print_commands);
    ctx.set_module_handler(|_, request| {
        Ok(format!("{}.{}({})", request.module, request.method, request.params))
    });
    Ok(ctx)
}

fn print_commands(context_id: i32, commands: &[UICommand]) {
    for command in commands {
        let operands = match command.decode_operands() {
            Ok(Operands::Remove) => String::new(),
            Ok(operands) => format!(" {:?}", operands),
            Err(e) => format!(" <{}>", e),
        };
        println!("[ctx {}] {:?} #{}{}", context_id, command.kind, command.target, operands);
    }
}

fn run_file(ctx: &mut ExecutingContext, filename: &str) {
    let source = match std::fs::read_to_string(filename) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error reading {}: {}", filename, e);
            process::exit(1);
        }
    };

    if let Err(e) = ctx.evaluate(&source, filename, 1) {
        eprintln!("{}", e);
        process::exit(1);
    }

    // Run timers until none are left
    loop {
        let deadline = match ctx.next_timer_deadline() {
            Ok(Some(deadline)) => deadline,
            Ok(None) => break,
            Err(e) => {
                eprintln!("{}", e);
                process::exit(1);
            }
        };
        let now = Instant::now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
        if let Err(e) = ctx.tick() {
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

fn run_repl(ctx: &mut ExecutingContext) {
    println!("DOM Bridge shell ({} engine)", ctx.engine_name().unwrap_or("?"));
    println!("Commands: .tick [ms]  .gc  .tree  .exit\n");

    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(e) => {
            eprintln!("Error starting line editor: {}", e);
            process::exit(1);
        }
    };

    let mut line_number = 1;
    loop {
        let line = match editor.readline("> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) => continue,
            Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("Error: {}", e);
                break;
            }
        };

        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(input);

        match input.split_whitespace().collect::<Vec<_>>().as_slice() {
            [".exit"] => break,
            [".gc"] => match ctx.collect_garbage() {
                Ok(stats) => println!(
                    "{} -> {} objects, {} wrappers finalized, {} nodes disposed",
                    stats.objects_before, stats.objects_after, stats.finalized, stats.nodes_disposed
                ),
                Err(e) => eprintln!("{}", e),
            },
            [".tick", rest @ ..] => {
                let advance = rest.first().and_then(|ms| ms.parse::<u64>().ok()).unwrap_or(0);
                match ctx.tick_at(Instant::now() + Duration::from_millis(advance)) {
                    Ok(summary) => println!("{:?}", summary),
                    Err(e) => eprintln!("{}", e),
                }
            }
            [".tree"] => print_tree(ctx),
            _ => {
                match ctx.evaluate(input, "<shell>", line_number) {
                    Ok(ScriptValue::Undefined) => {}
                    Ok(value) => match ctx.display(&value) {
                        Ok(text) => println!("{}", text),
                        Err(e) => eprintln!("{}", e),
                    },
                    Err(e) => eprintln!("{}", e),
                }
                line_number += 1;
            }
        }
    }

    ctx.dispose();
}

fn print_tree(ctx: &ExecutingContext) {
    let Ok(tree) = ctx.tree() else {
        return;
    };
    let mut stack = vec![(tree.document(), 0usize)];
    while let Some((id, depth)) = stack.pop() {
        let Ok(node) = tree.get(id) else {
            continue;
        };
        println!("{}{} #{}", "  ".repeat(depth), node.node_name(), id);
        for child in node.children().iter().rev() {
            stack.push((*child, depth + 1));
        }
    }
}
