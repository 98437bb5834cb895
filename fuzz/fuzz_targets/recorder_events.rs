#![no_main]

use calltree::{AddressResolver, Event, Recorder, Renderer};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|events: Vec<Event>| {
    // Unbalanced and out-of-order streams must never panic
    let mut recorder = Recorder::new();
    recorder.replay(events);

    if let Some(from) = recorder.report_root() {
        let renderer = Renderer::new(&AddressResolver);
        let _ = renderer.text_string(recorder.tree(), from);
        let _ = renderer.render_structured(recorder.tree(), from);
    }
});
