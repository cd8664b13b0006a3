// This module implements intrinsic specialization as an IR-to-IR expansion
// pass that runs before code generation. The subject function is cloned, then
// scanned with a block worklist: every operation whose descriptor resolves to
// a Redirect-mode implementation at the target architecture is replaced by the
// implementation's routine body, spliced inline. Splicing splits the block at
// the site, turns the substituted value into the continuation block's
// parameter (so existing uses stay valid without rewriting), remaps routine
// parameters onto the actual operands, and rewrites routine returns into
// branches to the continuation. Spliced blocks re-enter the worklist, so
// substituted bodies are themselves subject to specialization. Ordinary calls
// to device routines with bodies are inlined through the same splice path;
// calls to bodyless declarations must resolve through the registry or fail.

//! Redirect specialization and device-call inlining.

use hashbrown::HashMap;
use log::debug;

use crate::core::error::{CompileError, CompileResult};
use crate::core::intrinsics::{
    intrinsic_key_for, IntrinsicImplementation, IntrinsicKey, IntrinsicRegistry,
};
use crate::core::session::CompilationSession;
use crate::ir::{
    BlockData, BlockId, Function, IrContext, MethodId, Op, Terminator, TypeId, ValueData, ValueId,
};

/// Upper bound on transitive inlining. Reaching it means a redirect routine
/// expands into an operation that redirects back into it.
const MAX_INLINE_DEPTH: u32 = 32;

enum Action {
    Keep,
    Inline { callee: MethodId, redirect: bool },
}

/// Specialize `method` for `architecture`, returning a standalone function
/// with every Redirect-mode intrinsic and every device call expanded.
/// GenerateCode-mode intrinsics stay in place for the code generator.
pub fn specialize_method<I: IntrinsicImplementation>(
    ctx: &mut IrContext,
    method: MethodId,
    registry: &IntrinsicRegistry<I>,
    architecture: I::Architecture,
    session: &CompilationSession<'_>,
) -> CompileResult<Function> {
    let mut func = ctx.method(method).clone();
    let mut depth: Vec<u32> = vec![0; func.value_count()];
    let mut cache: HashMap<(IntrinsicKey, Option<TypeId>), MethodId> = HashMap::new();

    let mut worklist: Vec<BlockId> = (0..func.block_count()).map(BlockId::new).collect();
    let mut cursor = 0;
    while cursor < worklist.len() {
        let block = worklist[cursor];
        cursor += 1;

        let mut idx = 0;
        loop {
            let Some(&value) = func.block(block).values.get(idx) else {
                break;
            };
            match classify(ctx, &func, value, registry, architecture, &mut cache)? {
                Action::Keep => idx += 1,
                Action::Inline { callee, redirect } => {
                    let name = ctx.method(callee).name.clone();
                    if redirect {
                        session.record_redirect_inlined(&name);
                    } else {
                        debug!("inlining device call to {name}");
                    }
                    let callee = ctx.method(callee).clone();
                    let new_blocks = splice(&mut func, &mut depth, block, idx, value, &callee)?;
                    worklist.extend(new_blocks);
                    // Remaining values of `block` moved to the continuation,
                    // which is on the worklist now.
                    break;
                }
            }
        }
    }
    Ok(func)
}

fn classify<I: IntrinsicImplementation>(
    ctx: &mut IrContext,
    func: &Function,
    value: ValueId,
    registry: &IntrinsicRegistry<I>,
    architecture: I::Architecture,
    cache: &mut HashMap<(IntrinsicKey, Option<TypeId>), MethodId>,
) -> CompileResult<Action> {
    if let Some(key) = intrinsic_key_for(ctx, func, value) {
        if let Some(imp) = registry.resolve(&key, architecture) {
            if let Some(builder) = imp.redirect_builder() {
                let cache_key = (key, func.value_type(value));
                if let Some(&target) = cache.get(&cache_key) {
                    return Ok(Action::Inline {
                        callee: target,
                        redirect: true,
                    });
                }
                let target = builder(ctx, func, value)?;
                cache.insert(cache_key, target);
                return Ok(Action::Inline {
                    callee: target,
                    redirect: true,
                });
            }
            // GenerateCode-mode; the code generator invokes it.
            return Ok(Action::Keep);
        }
    }
    if let Op::Call { method, .. } = func.op(value) {
        let callee = ctx.method(*method);
        if callee.is_declaration() {
            return Err(CompileError::NotSupported {
                reason: format!(
                    "call to declared method '{}' has no registered implementation",
                    callee.name
                ),
            });
        }
        return Ok(Action::Inline {
            callee: *method,
            redirect: false,
        });
    }
    Ok(Action::Keep)
}

/// Splice `callee`'s body over the value at `block[idx]`. Returns the blocks
/// added to the function (callee clones plus the continuation).
fn splice(
    func: &mut Function,
    depth: &mut Vec<u32>,
    block: BlockId,
    idx: usize,
    site: ValueId,
    callee: &Function,
) -> CompileResult<Vec<BlockId>> {
    let site_depth = depth[site.index()];
    if site_depth + 1 > MAX_INLINE_DEPTH {
        return Err(CompileError::CodeGeneration {
            reason: format!(
                "inline depth exceeded {MAX_INLINE_DEPTH} while expanding '{}'",
                callee.name
            ),
        });
    }
    if !callee.block(callee.entry()).params.is_empty() {
        return Err(CompileError::CodeGeneration {
            reason: format!("routine '{}' entry block takes parameters", callee.name),
        });
    }

    // Actual arguments: the call's argument list, or the operand list for a
    // redirected operation (routine parameters follow operand order).
    let site_op = func.op(site).clone();
    let args = match &site_op {
        Op::Call { args, .. } => args.clone(),
        other => other.operands(),
    };
    if args.len() != callee.param_types.len() {
        return Err(CompileError::CodeGeneration {
            reason: format!(
                "routine '{}' takes {} parameters but the site provides {}",
                callee.name,
                callee.param_types.len(),
                args.len()
            ),
        });
    }
    // The substituted value keeps its uses, so the routine must produce a
    // value of the site's type.
    if func.value_type(site) != callee.return_type {
        return Err(CompileError::CodeGeneration {
            reason: format!(
                "routine '{}' return type does not match the value it replaces",
                callee.name
            ),
        });
    }

    // Split the block: values after the site and the terminator move to a
    // fresh continuation block.
    let cont = func.push_block(BlockData::default());
    let tail = func.block_mut(block).values.split_off(idx + 1);
    func.block_mut(block).values.pop();
    let original_term = func.block_mut(block).terminator.take();
    func.block_mut(cont).values = tail;
    func.block_mut(cont).terminator = original_term;

    // The substituted value becomes the continuation's parameter, fed by the
    // routine's returns. Uses of it need no rewriting.
    let returns_value = callee.return_type.is_some();
    if returns_value {
        func.value_mut(site).op = Op::BlockParam { index: 0 };
        func.block_mut(cont).params.push(site);
    } else {
        func.value_mut(site).op = Op::Nop;
    }

    // Clone callee blocks and values, remapping parameters onto arguments.
    let mut value_map: Vec<Option<ValueId>> = vec![None; callee.value_count()];
    for (param, arg) in callee.params.iter().zip(&args) {
        value_map[param.index()] = Some(*arg);
    }
    let block_map: Vec<BlockId> = (0..callee.block_count())
        .map(|_| func.push_block(BlockData::default()))
        .collect();

    for b in 0..callee.block_count() {
        let src = BlockId::new(b);
        let dst = block_map[b];
        for i in 0..callee.block(src).params.len() {
            let pv = callee.block(src).params[i];
            let data = callee.value(pv).clone();
            let id = func.push_value(data);
            depth.push(site_depth + 1);
            value_map[pv.index()] = Some(id);
            func.block_mut(dst).params.push(id);
        }
        for i in 0..callee.block(src).values.len() {
            let v = callee.block(src).values[i];
            let data = callee.value(v);
            for operand in data.op.operands() {
                if value_map[operand.index()].is_none() {
                    return Err(CompileError::CodeGeneration {
                        reason: format!(
                            "routine '{}' uses a value before its definition",
                            callee.name
                        ),
                    });
                }
            }
            let op = data
                .op
                .remapped(&mut |x| value_map[x.index()].expect("operand mapped"));
            let ty = data.ty;
            let id = func.push_value(ValueData { ty, op });
            depth.push(site_depth + 1);
            value_map[v.index()] = Some(id);
            func.block_mut(dst).values.push(id);
        }
    }

    // Rewrite terminators; returns become branches to the continuation.
    for b in 0..callee.block_count() {
        let src = BlockId::new(b);
        let term = callee
            .block(src)
            .terminator
            .clone()
            .ok_or_else(|| CompileError::CodeGeneration {
                reason: format!("routine '{}' has an unterminated block", callee.name),
            })?;
        let remap = |x: ValueId| value_map[x.index()].expect("operand mapped");
        let new_term = match term {
            Terminator::Ret { value } => {
                let args = match (returns_value, value) {
                    (true, Some(v)) => vec![remap(v)],
                    (true, None) => {
                        return Err(CompileError::CodeGeneration {
                            reason: format!(
                                "routine '{}' returns no value but the site expects one",
                                callee.name
                            ),
                        })
                    }
                    (false, _) => Vec::new(),
                };
                Terminator::Br { target: cont, args }
            }
            Terminator::Br { target, args } => Terminator::Br {
                target: block_map[target.index()],
                args: args.into_iter().map(remap).collect(),
            },
            Terminator::CondBr {
                cond,
                true_target,
                true_args,
                false_target,
                false_args,
            } => Terminator::CondBr {
                cond: remap(cond),
                true_target: block_map[true_target.index()],
                true_args: true_args.into_iter().map(remap).collect(),
                false_target: block_map[false_target.index()],
                false_args: false_args.into_iter().map(remap).collect(),
            },
        };
        func.block_mut(block_map[b]).terminator = Some(new_term);
    }

    // Enter the routine from the split block.
    func.block_mut(block).terminator = Some(Terminator::Br {
        target: block_map[callee.entry().index()],
        args: Vec::new(),
    });

    let mut new_blocks = block_map;
    new_blocks.push(cont);
    Ok(new_blocks)
}
