#[derive(Clone, Copy, Debug)]
pub struct ClassificationRule {
    pub pattern: &'static str,
    pub category: &'static str,
    pub explanation: &'static str,
}

/// Ordered, first match wins. Exact NTSTATUS codes come before generic
/// driver/engine substrings so a message carrying both resolves to the code.
pub const RULES: &[ClassificationRule] = &[
    // NTSTATUS exception codes
    ClassificationRule { pattern: "0xc0000005", category: "ACCESS_VIOLATION", explanation: "The program tried to read or write memory it does not own. Usually a bug in the game or a corrupted install; verify the game files and update the game and your graphics driver." },
    ClassificationRule { pattern: "0xc0000374", category: "HEAP_CORRUPTION", explanation: "The program corrupted its own memory bookkeeping. Often triggered by faulty mods or overlays; try disabling mods, overlays and injectors, then verify the game files." },
    ClassificationRule { pattern: "0xc00000fd", category: "STACK_OVERFLOW", explanation: "The program ran out of call stack, usually from runaway recursion. This is a bug in the game itself; check for a patch or report it to the developer." },
    ClassificationRule { pattern: "0xc0000409", category: "STACK_BUFFER_OVERRUN", explanation: "Windows stopped the program after it overwrote its own stack. Commonly caused by incompatible mods or an update gone wrong; reinstall or verify the game files." },
    ClassificationRule { pattern: "0xc000001d", category: "ILLEGAL_INSTRUCTION", explanation: "The CPU was asked to execute an instruction it does not support. Seen with very old CPUs missing newer instruction sets, or with unstable overclocks; reset any overclock first." },
    ClassificationRule { pattern: "0xc0000142", category: "DLL_INIT_FAILED", explanation: "A DLL the program needs failed to initialize. Frequently fixed by reinstalling the Visual C++ redistributables and the game." },
    ClassificationRule { pattern: "0xc0000135", category: "DLL_NOT_FOUND", explanation: "A DLL the program needs is missing. Reinstall the game and its prerequisites (Visual C++ redistributables, DirectX)." },
    ClassificationRule { pattern: "0xe0434352", category: "DOTNET_EXCEPTION", explanation: "An unhandled .NET error ended the program. Repair or reinstall the .NET runtime, then verify the game files." },
    ClassificationRule { pattern: "0x80000003", category: "BREAKPOINT", explanation: "The program hit a debug breakpoint outside a debugger. Often caused by anti-tamper tripping over an injected tool; close overlays and debugging software." },
    // GPU / graphics driver
    ClassificationRule { pattern: "nvwgf", category: "GPU_DRIVER", explanation: "The crash happened inside the NVIDIA Direct3D driver. Update (or clean-reinstall) the NVIDIA driver; if it persists, lower graphics settings." },
    ClassificationRule { pattern: "nvlddmkm", category: "GPU_DRIVER", explanation: "The NVIDIA kernel-mode driver reset or crashed. Update the driver and check GPU temperatures and overclocks." },
    ClassificationRule { pattern: "atidxx", category: "GPU_DRIVER", explanation: "The crash happened inside the AMD Direct3D driver. Update (or clean-reinstall) the AMD driver." },
    ClassificationRule { pattern: "amdkmdag", category: "GPU_DRIVER", explanation: "The AMD kernel-mode driver reset or crashed. Update the driver and check GPU temperatures and overclocks." },
    ClassificationRule { pattern: "d3d11", category: "DIRECT3D", explanation: "The crash points at Direct3D 11. Update your graphics driver and DirectX; lowering graphics settings can also help." },
    ClassificationRule { pattern: "d3d12", category: "DIRECT3D", explanation: "The crash points at Direct3D 12. Update your graphics driver; some games also offer a DirectX 11 mode as a workaround." },
    ClassificationRule { pattern: "dxgi", category: "DIRECT3D", explanation: "The crash points at the DirectX graphics infrastructure, often a device-removed error. Update the graphics driver and disable aggressive GPU overclocks." },
    // Game engines
    ClassificationRule { pattern: "unity", category: "UNITY_ENGINE", explanation: "A Unity engine crash. Check the game's own output log for details, update the game, and try verifying its files." },
    ClassificationRule { pattern: "unreal", category: "UNREAL_ENGINE", explanation: "An Unreal Engine crash. Clearing the game's shader/DerivedDataCache and updating the graphics driver are the usual fixes." },
    ClassificationRule { pattern: "ue4", category: "UNREAL_ENGINE", explanation: "An Unreal Engine 4 crash. Clearing the game's shader cache and updating the graphics driver are the usual fixes." },
    // Anti-cheat
    ClassificationRule { pattern: "easyanticheat", category: "ANTI_CHEAT", explanation: "Easy Anti-Cheat was involved in the crash. Repair the EAC service from the game's install folder and avoid running overlays or injectors alongside it." },
    ClassificationRule { pattern: "battleye", category: "ANTI_CHEAT", explanation: "BattlEye was involved in the crash. Reinstall the BattlEye service and make sure no other software is injecting into the game." },
    // DRM / platform
    ClassificationRule { pattern: "steam_api", category: "DRM", explanation: "The Steam API layer was involved in the crash. Verify the game files in Steam and restart the Steam client." },
    // Audio
    ClassificationRule { pattern: "xaudio", category: "AUDIO", explanation: "The crash happened in the XAudio subsystem. Update audio drivers and try disabling third-party audio enhancements." },
    ClassificationRule { pattern: "fmod", category: "AUDIO", explanation: "The crash happened in the FMOD audio middleware. Update audio drivers; switching the Windows default output device sometimes helps." },
    // Network
    ClassificationRule { pattern: "winsock", category: "NETWORK", explanation: "The crash points at the Windows socket layer. Check firewall/VPN software interfering with the game's networking." },
    ClassificationRule { pattern: "wininet", category: "NETWORK", explanation: "The crash points at the Windows internet stack. Check proxy/VPN settings and security software intercepting connections." },
];

/// First rule whose pattern occurs (case-insensitively) in the message.
/// `None` means the crash is reported unclassified, never dropped.
pub fn classify(message: &str) -> Option<&'static ClassificationRule> {
    let msg = message.to_lowercase();
    RULES.iter().find(|r| msg.contains(r.pattern))
}
