//! Enum destinations and presented sheets
//!
//! A root feature navigates between two child features held in an enum, and
//! presents a third one as a sheet. Lifecycle events are recorded in a scoped
//! runtime and printed at the end.

use std::thread;
use std::time::Duration;

use statebox::runtime::Runtime;
use statebox::{
    case_path, key_path, presents, Effect, PresentationAction, PresentationState, Store,
};
use tracing_subscriber::EnvFilter;

#[derive(Clone, Debug, Default, PartialEq)]
struct Counter {
    count: i32,
}

#[derive(Clone, Debug, PartialEq)]
enum CounterAction {
    Increment,
    Poll,
    Polled,
}

fn counter(state: &mut Counter, action: CounterAction) -> Effect<CounterAction> {
    match action {
        CounterAction::Increment | CounterAction::Polled => state.count += 1,
        CounterAction::Poll => {
            return Effect::run(|emitter| {
                while emitter.sleep(Duration::from_millis(50)) {
                    emitter.emit(CounterAction::Polled);
                }
            })
        }
    }
    Effect::none()
}

#[derive(Clone, Debug, Default, PartialEq)]
enum Destination {
    #[default]
    Home,
    Feature1(Counter),
    Feature2(Counter),
}

#[derive(Clone, Debug, PartialEq)]
enum DestinationAction {
    Feature1(CounterAction),
    Feature2(CounterAction),
}

#[derive(Clone, Debug, Default, PartialEq)]
struct App {
    destination: Destination,
    sheet: PresentationState<Counter>,
}

#[derive(Clone, Debug, PartialEq)]
enum AppAction {
    ShowFeature1,
    ShowFeature2,
    OpenSheet,
    Destination(DestinationAction),
    Sheet(PresentationAction<CounterAction>),
}

fn app(state: &mut App, action: AppAction) -> Effect<AppAction> {
    match action {
        AppAction::ShowFeature1 => state.destination = Destination::Feature1(Counter::default()),
        AppAction::ShowFeature2 => state.destination = Destination::Feature2(Counter::default()),
        AppAction::OpenSheet => {
            state.sheet.present(Counter::default());
        }
        AppAction::Destination(action) => {
            return match (&mut state.destination, action) {
                (Destination::Feature1(child), DestinationAction::Feature1(action)) => {
                    counter(child, action)
                        .map(|action| AppAction::Destination(DestinationAction::Feature1(action)))
                }
                (Destination::Feature2(child), DestinationAction::Feature2(action)) => {
                    counter(child, action)
                        .map(|action| AppAction::Destination(DestinationAction::Feature2(action)))
                }
                _ => Effect::none(),
            };
        }
        AppAction::Sheet(_) => {}
    }
    Effect::none()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("=== Destinations ===\n");

    Runtime::scope(|| {
        let reducer = presents(app, key_path!(App => sheet), case_path!(AppAction::Sheet), counter);
        let store = Store::new(App::default(), reducer);
        let destination =
            store.scope(key_path!(App => destination), case_path!(AppAction::Destination));

        println!("1. Navigating to feature 1");
        store.send(AppAction::ShowFeature1).wait();
        if let Some(feature) = destination.scope_case(
            case_path!(Destination::Feature1),
            case_path!(DestinationAction::Feature1),
        ) {
            feature.send(CounterAction::Increment).wait();
            println!("   feature 1 count: {}", feature.state().count);
        }

        println!("\n2. Navigating to feature 2");
        store.send(AppAction::ShowFeature2).wait();
        println!("   destination: {:?}", store.state().destination);

        println!("\n3. Presenting a sheet that polls");
        let sheet =
            store.scope_presentation(key_path!(App => sheet), case_path!(AppAction::Sheet));
        store.send(AppAction::OpenSheet).wait();
        if let Some(child) = sheet.scope() {
            let polling = child.send(CounterAction::Poll);
            thread::sleep(Duration::from_millis(175));
            println!("   sheet count: {}", child.state().count);

            println!("\n4. Dismissing the sheet");
            sheet.dismiss().wait();
            polling.wait();
            println!("   child live: {}", child.is_live());
        }
        println!("   effects running: {}", store.effects_in_flight());

        println!("\nLifecycle:");
        for event in Runtime::current().events() {
            println!("   {event}");
        }
    });
}
