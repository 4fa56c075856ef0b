use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use tether_core::*;
use tether_devtools::{InstanceReport, Inspector};

/// Stand-in for a chat service that pushes presence changes.
#[derive(Clone, Default)]
struct ChatApi {
    handlers: Rc<RefCell<HashMap<u32, Rc<dyn Fn(bool)>>>>,
}

impl ChatApi {
    fn subscribe(&self, friend_id: u32, handler: impl Fn(bool) + 'static) {
        log::info!("chat: subscribe {friend_id}");
        self.handlers.borrow_mut().insert(friend_id, Rc::new(handler));
    }

    fn unsubscribe(&self, friend_id: u32) {
        log::info!("chat: unsubscribe {friend_id}");
        self.handlers.borrow_mut().remove(&friend_id);
    }

    fn set_online(&self, friend_id: u32, online: bool) {
        let handler = self.handlers.borrow().get(&friend_id).cloned();
        if let Some(handler) = handler {
            handler(online);
        }
    }

    fn subscribers(&self) -> usize {
        self.handlers.borrow().len()
    }
}

fn use_friend_status(
    hooks: &mut Hooks<'_>,
    chat: &ChatApi,
    friend_id: u32,
) -> Result<Option<bool>, HookError> {
    let (online, set_online) = hooks.use_state(|| None::<bool>)?;
    let chat = chat.clone();
    hooks.use_effect(deps![friend_id], move || {
        chat.subscribe(friend_id, move |online| set_online.set(Some(online)));
        cleanup(move || chat.unsubscribe(friend_id))
    })?;
    Ok(online)
}

fn counter() -> anyhow::Result<()> {
    let click: Rc<RefCell<Option<SetState<i32>>>> = Rc::default();
    let mut rt: Runtime<(), String> = Runtime::new();
    let id = rt.mount("counter", (), {
        let click = click.clone();
        move |hooks, _| {
            let (count, set_count) = hooks.use_state(|| 0)?;
            hooks.use_effect(Deps::Always, move || {
                log::info!("document title: You clicked {count} times")
            })?;
            *click.borrow_mut() = Some(set_count);
            Ok(format!("You clicked {count} times"))
        }
    })?;
    rt.run_until_idle()?;

    for _ in 0..3 {
        if let Some(set_count) = click.borrow().as_ref() {
            set_count.update(|c| c + 1);
        }
        rt.run_until_idle()?;
    }
    log::info!("counter: {:?}", rt.output(id));
    Ok(())
}

fn friend_status() -> anyhow::Result<()> {
    let chat = ChatApi::default();
    let mut rt: Runtime<u32, &'static str> = Runtime::new();
    let id = rt.mount("friend-status", 100, {
        let chat = chat.clone();
        move |hooks, friend_id| {
            Ok(match use_friend_status(hooks, &chat, *friend_id)? {
                None => "Loading...",
                Some(true) => "Online",
                Some(false) => "Offline",
            })
        }
    })?;
    rt.run_until_idle()?;
    chat.set_online(100, true);
    rt.run_until_idle()?;
    log::info!("friend 100: {:?}", rt.output(id));

    for friend_id in [200, 300] {
        rt.set_props(id, friend_id)?;
        rt.run_until_idle()?;
    }
    chat.set_online(300, false);
    rt.run_until_idle()?;
    log::info!("friend 300: {:?}", rt.output(id));

    rt.unmount(id)?;
    log::info!("subscribers after unmount: {}", chat.subscribers());
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
struct Count {
    count: i32,
}

#[derive(Debug)]
enum Action {
    Increment,
    Decrement,
    Reset(i32),
}

fn lazy_counter() -> anyhow::Result<()> {
    let buttons: Rc<RefCell<Option<Dispatch<Action>>>> = Rc::default();
    let mut rt: Runtime<i32, Count> = Runtime::new();
    let id = rt.mount("lazy-counter", 5, {
        let buttons = buttons.clone();
        move |hooks, initial| {
            let (state, dispatch) = hooks.use_reducer_with(
                |state: &Count, action: Action| -> Result<Count, String> {
                    Ok(match action {
                        Action::Increment => Count {
                            count: state.count + 1,
                        },
                        Action::Decrement => Count {
                            count: state.count - 1,
                        },
                        Action::Reset(count) => Count { count },
                    })
                },
                *initial,
                |count| Count { count },
            )?;
            *buttons.borrow_mut() = Some(dispatch);
            Ok(state)
        }
    })?;

    let dispatch = buttons.borrow().clone();
    if let Some(dispatch) = dispatch {
        dispatch.dispatch(Action::Increment);
        dispatch.dispatch(Action::Increment);
        dispatch.dispatch(Action::Decrement);
        rt.run_until_idle()?;
        log::info!("lazy counter: {:?}", rt.output(id));

        dispatch.dispatch(Action::Reset(5));
        rt.run_until_idle()?;
    }
    log::info!("after reset: {:?}", rt.output(id));
    Ok(())
}

#[derive(Clone, Debug, PartialEq)]
struct Theme {
    foreground: &'static str,
    background: &'static str,
}

fn themed_button() -> anyhow::Result<()> {
    let theme = create_context(Theme {
        foreground: "#000000",
        background: "#eeeeee",
    });
    let mut rt: Runtime<(), String> = Runtime::new();
    let id = rt.mount("themed-button", (), {
        let theme = theme.clone();
        move |hooks, _| {
            let theme = hooks.use_context(&theme);
            Ok(format!(
                "I am styled by theme context! ({} on {})",
                theme.foreground, theme.background
            ))
        }
    })?;
    log::info!("{:?}", rt.output(id));

    rt.provide(
        &theme,
        Theme {
            foreground: "#ffffff",
            background: "#222222",
        },
    );
    rt.run_until_idle()?;
    log::info!("{:?}", rt.output(id));
    Ok(())
}

fn timer() -> anyhow::Result<()> {
    let ticks: Rc<RefCell<Vec<Box<dyn Fn()>>>> = Rc::default();
    let mut rt: Runtime<(), u32> = Runtime::new();
    let id = rt.mount("timer", (), {
        let ticks = ticks.clone();
        move |hooks, _| {
            let (elapsed, set_elapsed) = hooks.use_state(|| 0u32)?;
            let interval = hooks.use_ref(|| None::<usize>)?;
            let ticks = ticks.clone();
            let handle = interval.clone();
            hooks.use_effect(deps![], move || {
                let mut ticks = ticks.borrow_mut();
                handle.set(Some(ticks.len()));
                ticks.push(Box::new(move || set_elapsed.update(|s| s + 1)));
                cleanup(move || log::info!("clear interval {:?}", handle.take()))
            })?;
            Ok(elapsed)
        }
    })?;
    rt.run_until_idle()?;
    for _ in 0..4 {
        for tick in ticks.borrow().iter() {
            tick();
        }
        rt.run_until_idle()?;
    }
    log::info!("timer: {:?} seconds", rt.output(id));
    rt.unmount(id)?;
    Ok(())
}

fn form_wrong() -> anyhow::Result<()> {
    let mut rt: Runtime<bool, ()> = Runtime::new();
    let id = rt.mount("form", true, |hooks, persist| {
        let (name, _) = hooks.use_state(|| "Mary".to_string())?;
        if *persist {
            hooks.use_effect(Deps::Always, move || log::info!("saving {name}"))?;
        }
        let (surname, _) = hooks.use_state(|| "Poppins".to_string())?;
        hooks.use_effect(Deps::Always, move || {
            log::info!("document title: {surname}")
        })?;
        Ok(())
    })?;
    rt.run_until_idle()?;

    rt.set_props(id, false)?;
    match rt.run_until_idle() {
        Err(err) if err.is_order_violation() => log::warn!("{err}"),
        other => anyhow::bail!("expected a hook order violation, got {other:?}"),
    }
    if let Some(report) = InstanceReport::capture(&rt, id) {
        log::info!("ledger kept after the bad render:\n{}", report.table());
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    counter()?;
    friend_status()?;
    lazy_counter()?;
    themed_button()?;
    timer()?;
    form_wrong()?;

    let mut inspector = Inspector::new();
    let mut rt: Runtime<u32, ()> = Runtime::new();
    for n in 1..=3 {
        rt.mount(format!("list-item-{n}"), n, |hooks, n| {
            let n = *n;
            let squared = hooks.use_memo(deps![n], move || n * n)?;
            log::trace!("item {n} squared = {squared}");
            Ok(())
        })?;
    }
    for report in inspector.frame(&rt) {
        println!("{}", report.summary());
    }
    println!("{}", inspector.overlay());
    Ok(())
}
